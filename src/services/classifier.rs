//! Subject/topic suggestions and summaries from an OpenAI-compatible chat endpoint.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::extraction::extract_text;
use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static SUBJECT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\W*subject\W*:\s*(.+?)\s*$").expect("valid regex"));
static TOPIC_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\W*topic\W*:\s*(.+?)\s*$").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl Suggestion {
    fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            subject: clean(self.subject),
            topic: clean(self.topic),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Content classifier is not configured")]
    NotConfigured,

    #[error("Unsupported content: {0}")]
    Unsupported(String),

    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Unexpected classifier response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        ClassifierError::Request(err.to_string())
    }
}

/// Reads document content and produces study metadata
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn suggest(&self, data: &[u8], mime_type: &str) -> Result<Suggestion, ClassifierError>;
    async fn summarize(&self, data: &[u8], mime_type: &str) -> Result<String, ClassifierError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

const SUGGEST_PROMPT: &str = "You organise a student's study notes. Given the document text, \
answer with a JSON object {\"subject\": \"...\", \"topic\": \"...\"} naming the school subject \
and the specific topic it covers. Answer with the JSON object only.";

const SUMMARY_PROMPT: &str = "Summarise the following study notes for a student in a few short \
paragraphs. Keep key definitions, formulas and dates.";

pub struct LlmClassifier {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_input_chars: usize,
}

impl LlmClassifier {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        max_input_chars: usize,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            max_input_chars,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClassifierError> {
        Self::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_max_input_chars,
        )
    }

    async fn prepare_text(&self, data: &[u8], mime_type: &str) -> Result<String, ClassifierError> {
        let owned = data.to_vec();
        let mime = mime_type.to_string();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned, &mime))
            .await
            .map_err(|e| ClassifierError::Request(format!("extraction task failed: {}", e)))?
            .map_err(|e| ClassifierError::Unsupported(e.to_string()))?;

        let char_count = text.chars().count();
        if char_count > self.max_input_chars {
            debug!("Truncating {} characters of text to {}", char_count, self.max_input_chars);
            return Ok(text.chars().take(self.max_input_chars).collect());
        }
        Ok(text)
    }

    async fn complete(&self, system: &str, text: &str) -> Result<String, ClassifierError> {
        let api_key = self.api_key.as_deref().ok_or(ClassifierError::NotConfigured)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: text },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Chat completion returned {}: {}", status, body);
            return Err(ClassifierError::Request(format!("HTTP {}", status)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ClassifierError::InvalidResponse("empty completion".to_string()))
    }
}

/// Parse a suggestion answer: a JSON object (possibly fenced), else `Subject:` / `Topic:` lines
fn parse_suggestion(answer: &str) -> Option<Suggestion> {
    if let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) {
        if start < end {
            if let Ok(suggestion) = serde_json::from_str::<Suggestion>(&answer[start..=end]) {
                return Some(suggestion.normalized());
            }
        }
    }

    let capture = |re: &Regex| re.captures(answer).map(|c| c[1].trim_matches('"').to_string());
    let suggestion = Suggestion {
        subject: capture(&SUBJECT_LINE),
        topic: capture(&TOPIC_LINE),
    }
    .normalized();

    if suggestion.subject.is_none() && suggestion.topic.is_none() {
        None
    } else {
        Some(suggestion)
    }
}

#[async_trait]
impl ContentClassifier for LlmClassifier {
    async fn suggest(&self, data: &[u8], mime_type: &str) -> Result<Suggestion, ClassifierError> {
        if self.api_key.is_none() {
            return Err(ClassifierError::NotConfigured);
        }
        let text = self.prepare_text(data, mime_type).await?;
        let answer = self.complete(SUGGEST_PROMPT, &text).await?;
        parse_suggestion(&answer).ok_or(ClassifierError::InvalidResponse(answer))
    }

    async fn summarize(&self, data: &[u8], mime_type: &str) -> Result<String, ClassifierError> {
        if self.api_key.is_none() {
            return Err(ClassifierError::NotConfigured);
        }
        let text = self.prepare_text(data, mime_type).await?;
        self.complete(SUMMARY_PROMPT, &text).await
    }
}
