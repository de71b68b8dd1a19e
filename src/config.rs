use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;

/// Where uploaded bytes end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    /// Each principal's own Google Drive
    Drive,
    /// Local filesystem under `upload_path`, for development
    Local,
}

impl FromStr for StorageBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "drive" | "gdrive" | "google_drive" => Ok(StorageBackendKind::Drive),
            "local" => Ok(StorageBackendKind::Local),
            other => Err(anyhow!("Unknown STORAGE_BACKEND '{}' (expected 'drive' or 'local')", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub upload_path: String,
    pub max_file_size_mb: u64,
    pub storage_backend: StorageBackendKind,

    // Google OAuth / Drive
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_user_redirect_uri: Option<String>,
    pub google_teacher_redirect_uri: Option<String>,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_userinfo_url: String,
    pub drive_api_base: String,
    pub drive_upload_base: String,

    // LLM classifier
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_max_input_chars: usize,

    pub frontend_url: String,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_var_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid value for {}: '{}'", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = Self::database_url_from_env()?;

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| anyhow!("JWT_SECRET must be set"))?;
        if jwt_secret.len() < 16 {
            return Err(anyhow!("JWT_SECRET must be at least 16 characters long"));
        }

        let server_address = match optional_var("SERVER_ADDRESS") {
            Some(address) => address,
            None => format!(
                "{}:{}",
                var_or("SERVER_HOST", "0.0.0.0"),
                var_or("SERVER_PORT", "8000")
            ),
        };

        let storage_backend = match optional_var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackendKind::Drive,
        };

        let config = Config {
            database_url,
            server_address,
            jwt_secret,
            jwt_expiry_hours: parsed_var_or("JWT_EXPIRY_HOURS", 24 * 7)?,
            upload_path: var_or("UPLOAD_PATH", "./uploads"),
            max_file_size_mb: parsed_var_or("MAX_FILE_SIZE_MB", 50)?,
            storage_backend,
            google_client_id: optional_var("GOOGLE_CLIENT_ID"),
            google_client_secret: optional_var("GOOGLE_CLIENT_SECRET"),
            google_user_redirect_uri: optional_var("GOOGLE_USER_REDIRECT_URI"),
            google_teacher_redirect_uri: optional_var("GOOGLE_TEACHER_REDIRECT_URI"),
            google_auth_url: var_or("GOOGLE_AUTH_URL", "https://accounts.google.com/o/oauth2/v2/auth"),
            google_token_url: var_or("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            google_userinfo_url: var_or(
                "GOOGLE_USERINFO_URL",
                "https://openidconnect.googleapis.com/v1/userinfo",
            ),
            drive_api_base: var_or("DRIVE_API_BASE", "https://www.googleapis.com/drive/v3"),
            drive_upload_base: var_or("DRIVE_UPLOAD_BASE", "https://www.googleapis.com/upload/drive/v3"),
            llm_api_url: var_or("LLM_API_URL", "https://api.openai.com/v1"),
            llm_api_key: optional_var("LLM_API_KEY"),
            llm_model: var_or("LLM_MODEL", "gpt-4o-mini"),
            llm_max_input_chars: parsed_var_or("LLM_MAX_INPUT_CHARS", 12_000)?,
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),
        };

        Ok(config)
    }

    /// DATABASE_URL wins; otherwise the URL is assembled from the POSTGRES_* parts.
    fn database_url_from_env() -> Result<String> {
        if let Ok(url) = env::var("DATABASE_URL") {
            if !(url.starts_with("postgresql://") || url.starts_with("postgres://")) {
                return Err(anyhow!(
                    "Invalid database URL format: must start with postgresql:// or postgres://"
                ));
            }
            return Ok(url);
        }

        let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
        let db = env::var("POSTGRES_DB").unwrap_or_else(|_| "pingnotes".to_string());
        let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "pingnotes".to_string());
        let password = env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "pingnotes".to_string());

        Ok(format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, db))
    }

    /// Both Google client credentials are present.
    pub fn google_oauth_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}
