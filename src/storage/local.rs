//! Local filesystem backend, for development without a Google account

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info};
use uuid::Uuid;

use super::{CloudFileStore, RemoteObject, StorageError, StorageResult};

/// Stores objects under `<upload_path>/documents`, ignoring credentials
pub struct LocalFileStore {
    upload_path: String,
}

impl LocalFileStore {
    pub fn new(upload_path: String) -> Self {
        Self { upload_path }
    }

    /// Get path for documents subdirectory
    pub fn get_documents_path(&self) -> PathBuf {
        Path::new(&self.upload_path).join("documents")
    }

    /// Resolve a remote id to a path, refusing anything that could escape the documents dir
    fn object_path(&self, remote_id: &str) -> StorageResult<PathBuf> {
        if remote_id.is_empty()
            || remote_id.contains("..")
            || remote_id.contains('/')
            || remote_id.contains('\\')
        {
            return Err(StorageError::NotFound(remote_id.to_string()));
        }
        Ok(self.get_documents_path().join(remote_id))
    }

    pub async fn initialize(&self) -> StorageResult<()> {
        let documents_dir = self.get_documents_path();
        if let Err(e) = fs::create_dir_all(&documents_dir).await {
            error!("Failed to create directory {:?}: {}", documents_dir, e);
            return Err(e.into());
        }
        info!("Ensured directory exists: {:?}", documents_dir);
        Ok(())
    }
}

#[async_trait]
impl CloudFileStore for LocalFileStore {
    async fn upload(&self, data: &[u8], _mime_type: &str, original_name: &str, _access_token: &str) -> StorageResult<RemoteObject> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let object_id = Uuid::new_v4();
        let remote_id = if extension.is_empty() {
            object_id.to_string()
        } else {
            format!("{}.{}", object_id, extension)
        };

        let documents_dir = self.get_documents_path();
        fs::create_dir_all(&documents_dir).await?;

        let file_path = documents_dir.join(&remote_id);
        fs::write(&file_path, data).await?;

        info!("Stored document locally: {}", file_path.display());
        Ok(RemoteObject {
            view_url: format!("file://{}", file_path.display()),
            remote_id,
        })
    }

    async fn download(&self, remote_id: &str, _access_token: &str, destination: &Path) -> StorageResult<()> {
        let source = self.object_path(remote_id)?;
        match fs::copy(&source, destination).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(remote_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, remote_id: &str, _access_token: &str) -> StorageResult<()> {
        let path = self.object_path(remote_id)?;
        match fs::remove_file(&path).await {
            Ok(_) => {
                info!("Deleted file: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("File already deleted: {}", path.display());
                Err(StorageError::NotFound(remote_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
