//! Factory for creating cloud file stores based on configuration

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use super::google_drive::GoogleDriveStore;
use super::local::LocalFileStore;
use super::CloudFileStore;
use crate::config::{Config, StorageBackendKind};

/// Create the configured cloud file store
pub async fn create_cloud_store(config: &Config) -> Result<Arc<dyn CloudFileStore>> {
    let store: Arc<dyn CloudFileStore> = match config.storage_backend {
        StorageBackendKind::Drive => Arc::new(GoogleDriveStore::new(
            config.drive_api_base.clone(),
            config.drive_upload_base.clone(),
        )?),
        StorageBackendKind::Local => {
            let backend = LocalFileStore::new(config.upload_path.clone());
            backend.initialize().await?;
            Arc::new(backend)
        }
    };

    info!("Using {} file storage", store.storage_type());
    Ok(store)
}
