//! Google Drive v3 backend
//!
//! Files are created in the owner's Drive with a multipart/related upload and
//! addressed by their Drive file id afterwards.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CloudFileStore, RemoteObject, StorageError, StorageResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    web_view_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleDriveStore {
    client: Client,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveStore {
    pub fn new(api_base: impl Into<String>, upload_base: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, remote_id: &str) -> String {
        format!("{}/files/{}", self.api_base, urlencoding::encode(remote_id))
    }

    /// Build a multipart/related body: JSON metadata part followed by the media part
    fn multipart_related_body(boundary: &str, metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    /// Map a Drive response status onto the storage error taxonomy
    async fn check_status(response: Response, remote_id: &str) -> StorageResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => {
                debug!("Drive rejected credential: {}", body);
                Err(StorageError::CredentialExpired)
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(remote_id.to_string())),
            _ => Err(StorageError::Request(format!("Drive returned {}: {}", status, body))),
        }
    }
}

#[async_trait]
impl CloudFileStore for GoogleDriveStore {
    async fn upload(&self, data: &[u8], mime_type: &str, original_name: &str, access_token: &str) -> StorageResult<RemoteObject> {
        let boundary = format!("pingnotes-{}", Uuid::new_v4().simple());
        let metadata = serde_json::json!({
            "name": original_name,
            "mimeType": mime_type,
        });
        let body = Self::multipart_related_body(&boundary, &metadata, mime_type, data);

        let response = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
            .bearer_auth(access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        let response = Self::check_status(response, original_name).await?;
        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| StorageError::Request(format!("Unexpected Drive upload response: {}", e)))?;

        let view_url = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));

        info!("Uploaded '{}' to Drive as {}", original_name, file.id);
        Ok(RemoteObject {
            remote_id: file.id,
            view_url,
        })
    }

    async fn download(&self, remote_id: &str, access_token: &str, destination: &Path) -> StorageResult<()> {
        let response = self
            .client
            .get(self.file_url(remote_id))
            .query(&[("alt", "media")])
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::check_status(response, remote_id).await?;
        let bytes = response.bytes().await?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(destination, &bytes).await?;

        debug!("Downloaded Drive file {} ({} bytes) to {}", remote_id, bytes.len(), destination.display());
        Ok(())
    }

    async fn delete(&self, remote_id: &str, access_token: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(self.file_url(remote_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        match Self::check_status(response, remote_id).await {
            Ok(_) => {
                info!("Deleted Drive file {}", remote_id);
                Ok(())
            }
            Err(e) => {
                warn!("Drive delete of {} failed: {}", remote_id, e);
                Err(e)
            }
        }
    }

    fn storage_type(&self) -> &'static str {
        "google_drive"
    }
}
