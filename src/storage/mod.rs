//! Cloud file store abstraction
//!
//! Uploaded bytes live in the owning principal's own storage account. Every call
//! carries that principal's bearer credential, so an expired credential has to be
//! distinguishable from other failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod factory;
pub mod google_drive;
pub mod local;

/// Handle to an object stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub remote_id: String,
    pub view_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("provider credential expired")]
    CredentialExpired,
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("remote storage request failed: {0}")]
    Request(String),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, StorageError::CredentialExpired)
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Request(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait CloudFileStore: Send + Sync {
    /// Upload bytes on behalf of the credential's owner
    async fn upload(&self, data: &[u8], mime_type: &str, original_name: &str, access_token: &str) -> StorageResult<RemoteObject>;

    /// Download an object's bytes into `destination`
    async fn download(&self, remote_id: &str, access_token: &str, destination: &Path) -> StorageResult<()>;

    /// Delete an object. Callers treat `NotFound` as success.
    async fn delete(&self, remote_id: &str, access_token: &str) -> StorageResult<()>;

    /// Human-readable backend name
    fn storage_type(&self) -> &'static str;
}
