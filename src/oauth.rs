//! Google OAuth: sign-in flows for users and teachers, and access-token refresh.
//!
//! One [`GoogleOAuthClient`] is registered per principal kind in an
//! [`OAuthRegistry`] built at startup and handed to the router through `AppState`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::models::PrincipalKind;

const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const STATE_TTL: Duration = Duration::from_secs(600);

type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Result of exchanging a refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedCredential {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token
    pub refresh_token: Option<String>,
}

/// Exchanges a long-lived refresh credential for a new access credential
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedCredential>;
}

/// Refresher used when Google OAuth is not configured; every refresh fails
pub struct UnconfiguredRefresher;

#[async_trait]
impl CredentialRefresher for UnconfiguredRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedCredential> {
        Err(anyhow!("Google OAuth is not configured; cannot refresh credentials"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// csrf state -> expiry
type StateStore = Mutex<HashMap<String, Instant>>;

pub struct GoogleOAuthClient {
    oauth_client: GoogleClient,
    http_client: Client,
    userinfo_url: String,
    pending_states: StateStore,
}

impl GoogleOAuthClient {
    pub fn new(config: &Config, redirect_uri: Option<&str>) -> Result<Self> {
        let client_id = config
            .google_client_id
            .as_ref()
            .ok_or_else(|| anyhow!("GOOGLE_CLIENT_ID not configured"))?;
        let client_secret = config
            .google_client_secret
            .as_ref()
            .ok_or_else(|| anyhow!("GOOGLE_CLIENT_SECRET not configured"))?;

        let mut oauth_client = BasicClient::new(ClientId::new(client_id.clone()))
            .set_client_secret(ClientSecret::new(client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.google_auth_url.clone())?)
            .set_token_uri(TokenUrl::new(config.google_token_url.clone())?);

        if let Some(redirect_uri) = redirect_uri {
            oauth_client = oauth_client.set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);
        }

        // The token endpoint must not be followed through redirects
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            oauth_client,
            http_client,
            userinfo_url: config.google_userinfo_url.clone(),
            pending_states: Mutex::new(HashMap::new()),
        })
    }

    /// Consent URL requesting offline access so Google issues a refresh token
    pub fn get_authorization_url(&self) -> (Url, CsrfToken) {
        self.cleanup_expired_states();

        let (url, csrf_token) = self
            .oauth_client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new(DRIVE_FILE_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        let mut store = self.pending_states.lock().unwrap_or_else(|e| e.into_inner());
        store.insert(csrf_token.secret().clone(), Instant::now() + STATE_TTL);

        (url, csrf_token)
    }

    fn cleanup_expired_states(&self) {
        let mut store = self.pending_states.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        store.retain(|_, expiry| *expiry > now);
    }

    fn take_state(&self, state: &str) -> bool {
        let mut store = self.pending_states.lock().unwrap_or_else(|e| e.into_inner());
        matches!(store.remove(state), Some(expiry) if expiry > Instant::now())
    }

    pub async fn exchange_code(&self, code: &str, state: Option<&str>) -> Result<GoogleTokens> {
        let state = state.ok_or_else(|| anyhow!("State parameter missing from OAuth callback"))?;
        if !self.take_state(state) {
            return Err(anyhow!("OAuth state not recognised (expired or forged)"));
        }

        let token_result = self
            .oauth_client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| anyhow!("Failed to exchange authorization code: {}", e))?;

        Ok(GoogleTokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
        })
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<GoogleUserInfo> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch user info: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("User info request failed with status: {}", response.status()));
        }

        let user_info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse user info: {}", e))?;

        Ok(user_info)
    }
}

#[async_trait]
impl CredentialRefresher for GoogleOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedCredential> {
        let token_result = self
            .oauth_client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| anyhow!("Failed to refresh access token: {}", e))?;

        debug!("Refreshed Google access token");
        Ok(RefreshedCredential {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
        })
    }
}

/// Sign-in flows keyed by principal kind, plus the shared refresher
pub struct OAuthRegistry {
    flows: HashMap<PrincipalKind, Arc<GoogleOAuthClient>>,
    refresher: Arc<GoogleOAuthClient>,
}

impl OAuthRegistry {
    /// Returns `None` when Google credentials are not configured
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        if !config.google_oauth_configured() {
            info!("Google OAuth not configured; sign-in routes disabled");
            return Ok(None);
        }

        let mut flows = HashMap::new();
        let redirects = [
            (PrincipalKind::User, config.google_user_redirect_uri.as_deref()),
            (PrincipalKind::Teacher, config.google_teacher_redirect_uri.as_deref()),
        ];
        for (kind, redirect_uri) in redirects {
            if let Some(redirect_uri) = redirect_uri {
                flows.insert(kind, Arc::new(GoogleOAuthClient::new(config, Some(redirect_uri))?));
                info!("Registered Google sign-in flow for {}", kind);
            }
        }

        Ok(Some(Self {
            flows,
            refresher: Arc::new(GoogleOAuthClient::new(config, None)?),
        }))
    }

    pub fn flow(&self, kind: PrincipalKind) -> Option<&Arc<GoogleOAuthClient>> {
        self.flows.get(&kind)
    }

    pub fn refresher(&self) -> Arc<dyn CredentialRefresher> {
        self.refresher.clone()
    }
}
