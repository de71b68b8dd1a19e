//! File lifecycle orchestration: upload, trash/restore, permanent removal,
//! sharing and summaries.
//!
//! Every operation takes the acting principal explicitly. Records live in the
//! [`DocumentStore`], bytes live in the owner's cloud storage, and the manager
//! keeps the two consistent. Steps that are allowed to fail (remote cleanup,
//! suggestions, temp file removal) return `Result`s that are logged and dropped.

use anyhow::Result as AnyResult;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::DocumentStore;
use crate::error::FileError;
use crate::models::{
    FileRecord, NewFileRecord, NewSubject, Owner, Principal, ShareOutcome, UploadOutcome, UploadedFile,
};
use crate::oauth::CredentialRefresher;
use crate::services::classifier::ContentClassifier;
use crate::storage::{CloudFileStore, RemoteObject, StorageError};

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Parse a client-supplied record id.
///
/// Front-ends send the literal `"undefined"` when they lose track of an id; that
/// case gets its own error so it can be told apart from garbage input.
pub fn parse_id(raw: &str) -> Result<Uuid, FileError> {
    let raw = raw.trim();
    if raw == "undefined" {
        return Err(FileError::InvalidId);
    }
    Uuid::parse_str(raw).map_err(|_| FileError::InvalidInput(format!("'{}' is not a valid id", raw)))
}

/// Subject and topic of a shared file, copied into each recipient's tree
struct ShareFolder {
    subject_name: String,
    subject_code: String,
    topic_name: String,
    topic_description: Option<String>,
}

pub struct FileLifecycleManager {
    store: Arc<dyn DocumentStore>,
    cloud: Arc<dyn CloudFileStore>,
    refresher: Arc<dyn CredentialRefresher>,
    classifier: Arc<dyn ContentClassifier>,
    temp_dir: PathBuf,
}

impl FileLifecycleManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cloud: Arc<dyn CloudFileStore>,
        refresher: Arc<dyn CredentialRefresher>,
        classifier: Arc<dyn ContentClassifier>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            cloud,
            refresher,
            classifier,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub async fn upload(
        &self,
        files: Vec<UploadedFile>,
        owner: Owner,
        subject_id: Option<&str>,
        topic_id: Option<&str>,
    ) -> Result<UploadOutcome, FileError> {
        let prepared = match self.prepare_upload(&files, owner, subject_id, topic_id).await {
            Ok(prepared) => prepared,
            Err(e) => {
                remove_temp_files(&files).await;
                return Err(e);
            }
        };
        let (mut access_token, subject, topic) = prepared;

        let mut outcome = UploadOutcome::default();
        for (index, file) in files.iter().enumerate() {
            let result = self.upload_one(file, owner, &mut access_token, subject, topic).await;

            match result {
                Ok((record, data)) => {
                    if index == 0 {
                        match self.classifier.suggest(&data, &file.mime_type).await {
                            Ok(suggestion) => {
                                outcome.suggested_subject = suggestion.subject;
                                outcome.suggested_topic = suggestion.topic;
                            }
                            Err(e) => warn!("Could not suggest a subject for {}: {}", record.name, e),
                        }
                    }
                    remove_temp_file(&file.temp_path).await;
                    outcome.files.push(record);
                }
                Err(e) => {
                    error!("Upload of {} for {} failed: {}", file.original_name, owner, e);
                    remove_temp_files(&files[index..]).await;
                    return Err(e);
                }
            }
        }

        info!("Uploaded {} file(s) for {}", outcome.files.len(), owner);
        Ok(outcome)
    }

    /// Validates the upload before anything is sent to remote storage
    async fn prepare_upload(
        &self,
        files: &[UploadedFile],
        owner: Owner,
        subject_id: Option<&str>,
        topic_id: Option<&str>,
    ) -> Result<(String, Option<Uuid>, Option<Uuid>), FileError> {
        if files.is_empty() {
            return Err(FileError::InvalidInput("No files uploaded".to_string()));
        }

        let subject_id = subject_id.filter(|s| !s.trim().is_empty()).map(parse_id).transpose()?;
        let topic_id = topic_id.filter(|s| !s.trim().is_empty()).map(parse_id).transpose()?;

        let (subject, topic) = match (subject_id, topic_id) {
            (None, Some(_)) => {
                return Err(FileError::InvalidInput("topic_id requires subject_id".to_string()))
            }
            (None, None) => (None, None),
            (Some(subject_id), topic_id) => {
                let subject = self
                    .store
                    .get_subject(subject_id)
                    .await?
                    .filter(|s| s.owner() == owner)
                    .ok_or(FileError::NotFound("Subject"))?;
                if let Some(topic_id) = topic_id {
                    subject.topic(topic_id).ok_or(FileError::NotFound("Topic"))?;
                }
                (Some(subject.id), topic_id)
            }
        };

        let principal = self.load_principal(owner).await?;
        let access_token = principal
            .access_token()
            .ok_or_else(FileError::missing_credential)?
            .to_string();

        Ok((access_token, subject, topic))
    }

    async fn upload_one(
        &self,
        file: &UploadedFile,
        owner: Owner,
        access_token: &mut String,
        subject: Option<Uuid>,
        topic: Option<Uuid>,
    ) -> Result<(FileRecord, Vec<u8>), FileError> {
        let data = tokio::fs::read(&file.temp_path).await.map_err(|e| {
            FileError::UploadFailed(format!("could not read uploaded file {}: {}", file.original_name, e))
        })?;

        let remote = self.upload_with_refresh(&data, file, owner, access_token).await?;
        debug!("Stored {} remotely as {}", file.original_name, remote.remote_id);

        let new_record = NewFileRecord {
            name: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            remote_id: remote.remote_id.clone(),
            view_url: remote.view_url.clone(),
            owner,
            linked_subject: subject,
            linked_topic: topic,
            is_shared: false,
            original_file: None,
        };

        match self.store.create_file(new_record).await {
            Ok(record) => Ok((record, data)),
            Err(e) => {
                // no record points at the object, so it can go
                if let Err(cleanup) = self.cloud.delete(&remote.remote_id, access_token).await {
                    warn!("Failed to remove orphaned remote object {}: {}", remote.remote_id, cleanup);
                }
                Err(FileError::Store(e))
            }
        }
    }

    /// Upload, refreshing the owner's credential once if the provider rejects it
    async fn upload_with_refresh(
        &self,
        data: &[u8],
        file: &UploadedFile,
        owner: Owner,
        access_token: &mut String,
    ) -> Result<RemoteObject, FileError> {
        match self.cloud.upload(data, &file.mime_type, &file.original_name, access_token).await {
            Ok(remote) => return Ok(remote),
            Err(e) if e.is_credential_expired() => {
                info!("Provider credential for {} expired, refreshing", owner);
            }
            Err(e) => return Err(FileError::UploadFailed(e.to_string())),
        }

        *access_token = self.refresh_credential(owner).await?;

        match self.cloud.upload(data, &file.mime_type, &file.original_name, access_token).await {
            Ok(remote) => Ok(remote),
            Err(e) if e.is_credential_expired() => {
                warn!("Refreshed credential for {} was rejected", owner);
                Err(FileError::AuthExpired)
            }
            Err(e) => Err(FileError::UploadFailed(e.to_string())),
        }
    }

    /// Exchange the stored refresh token and persist the result; returns the new access token
    async fn refresh_credential(&self, owner: Owner) -> Result<String, FileError> {
        let principal = self.store.get_principal(owner).await?.ok_or(FileError::AuthExpired)?;
        let refresh_token = principal.refresh_token().ok_or_else(|| {
            warn!("No refresh token stored for {}", owner);
            FileError::AuthExpired
        })?;

        let refreshed = self.refresher.refresh(refresh_token).await.map_err(|e| {
            warn!("Credential refresh for {} failed: {}", owner, e);
            FileError::AuthExpired
        })?;

        self.store
            .update_credentials(owner, &refreshed.access_token, refreshed.refresh_token.as_deref())
            .await?;
        debug!("Stored refreshed credential for {}", owner);

        Ok(refreshed.access_token)
    }

    pub async fn list(&self, owner: Owner) -> Result<Vec<FileRecord>, FileError> {
        Ok(self.store.list_files(owner, false).await?)
    }

    pub async fn list_trash(&self, owner: Owner) -> Result<Vec<FileRecord>, FileError> {
        Ok(self.store.list_files(owner, true).await?)
    }

    pub async fn get(&self, file_id: &str, requester: Owner) -> Result<FileRecord, FileError> {
        let id = parse_id(file_id)?;
        self.owned_file(id, requester).await
    }

    pub async fn trash(&self, file_id: &str, requester: Owner) -> Result<FileRecord, FileError> {
        self.set_deleted(file_id, requester, true).await
    }

    pub async fn restore(&self, file_id: &str, requester: Owner) -> Result<FileRecord, FileError> {
        self.set_deleted(file_id, requester, false).await
    }

    async fn set_deleted(&self, file_id: &str, requester: Owner, deleted: bool) -> Result<FileRecord, FileError> {
        let id = parse_id(file_id)?;
        self.owned_file(id, requester).await?;

        let record = self
            .store
            .set_file_deleted(id, deleted)
            .await?
            .ok_or(FileError::NotFound("File"))?;
        info!("File {} {} by {}", id, if deleted { "trashed" } else { "restored" }, requester);
        Ok(record)
    }

    pub async fn trash_all(&self, owner: Owner) -> Result<u64, FileError> {
        let count = self.store.trash_all_files(owner).await?;
        info!("Moved {} file(s) of {} to trash", count, owner);
        Ok(count)
    }

    pub async fn permanent_delete(&self, file_id: &str, requester: Owner) -> Result<(), FileError> {
        let id = parse_id(file_id)?;
        let record = self.owned_file(id, requester).await?;

        let principal = self.load_principal(requester).await?;
        let access_token = principal.access_token().ok_or_else(FileError::missing_credential)?;

        if let Err(e) = self.release_remote(&record, access_token).await {
            warn!("Remote delete of {} for file {} failed: {}", record.remote_id, id, e);
        }

        if !self.store.delete_file(id).await? {
            return Err(FileError::NotFound("File"));
        }
        info!("File {} permanently deleted by {}", id, requester);
        Ok(())
    }

    pub async fn empty_trash(&self, owner: Owner) -> Result<u64, FileError> {
        let trashed = self.store.list_files(owner, true).await?;
        let principal = self.store.get_principal(owner).await?;
        let access_token = principal.as_ref().and_then(Principal::access_token);
        if access_token.is_none() {
            warn!("No provider credential for {}; skipping remote deletes while emptying trash", owner);
        }

        let mut removed = 0u64;
        for record in &trashed {
            if let Some(token) = access_token {
                if let Err(e) = self.release_remote(record, token).await {
                    warn!("Remote delete of {} for file {} failed: {}", record.remote_id, record.id, e);
                }
            }

            match self.store.delete_file(record.id).await {
                Ok(true) => removed += 1,
                Ok(false) => debug!("File {} already gone", record.id),
                Err(e) => warn!("Failed to delete file {} while emptying trash: {}", record.id, e),
            }
        }

        info!("Emptied trash for {}: {} of {} file(s) removed", owner, removed, trashed.len());
        Ok(removed)
    }

    /// Delete the remote object behind an uploaded record.
    ///
    /// Share-copies point at an object in the sharer's Drive, which the copy's
    /// owner cannot delete, so only the uploader's own record releases it.
    async fn release_remote(&self, record: &FileRecord, access_token: &str) -> AnyResult<()> {
        if record.is_shared {
            debug!(
                "Not deleting remote object {} for share-copy {}: owned by the sharer",
                record.remote_id, record.id
            );
            return Ok(());
        }

        match self.cloud.delete(&record.remote_id, access_token).await {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn share(&self, file_id: &str, targets: &[String], sharer: Owner) -> Result<ShareOutcome, FileError> {
        let id = parse_id(file_id)?;
        let source = self.owned_file(id, sharer).await?;
        let folder = self.share_folder(&source).await?;

        let mut outcome = ShareOutcome::default();
        for target in targets {
            match self.share_with_target(&source, folder.as_ref(), target.trim(), sharer).await {
                Ok(true) => outcome.shared += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    warn!("Sharing file {} with '{}' failed: {}", id, target, e);
                    outcome.skipped += 1;
                }
            }
        }

        info!(
            "File {} shared by {}: {} shared, {} skipped",
            id, sharer, outcome.shared, outcome.skipped
        );
        Ok(outcome)
    }

    async fn share_folder(&self, source: &FileRecord) -> Result<Option<ShareFolder>, FileError> {
        let (Some(subject_id), Some(topic_id)) = (source.linked_subject, source.linked_topic) else {
            return Ok(None);
        };
        let Some(subject) = self.store.get_subject(subject_id).await? else {
            return Ok(None);
        };

        Ok(subject.topic(topic_id).map(|topic| ShareFolder {
            subject_name: subject.name.clone(),
            subject_code: subject.code.clone(),
            topic_name: topic.name.clone(),
            topic_description: topic.description.clone(),
        }))
    }

    /// Returns `Ok(false)` when the target is skipped
    async fn share_with_target(
        &self,
        source: &FileRecord,
        folder: Option<&ShareFolder>,
        target: &str,
        sharer: Owner,
    ) -> AnyResult<bool> {
        let recipient = if let Ok(user_id) = Uuid::parse_str(target) {
            self.store.get_principal(Owner::User(user_id)).await?
        } else if EMAIL_REGEX.is_match(target) {
            self.store.find_user_by_email(target).await?
        } else {
            None
        };

        let Some(recipient) = recipient else {
            info!("Share target '{}' not found; skipping", target);
            return Ok(false);
        };
        let recipient_owner = recipient.owner();
        if recipient_owner == sharer {
            debug!("Not sharing file {} with its own owner", source.id);
            return Ok(false);
        }

        if self.store.add_friend(recipient.id, sharer.id()).await? {
            debug!("Added {} to friends of {}", sharer, recipient_owner);
        }

        let (subject, topic) = match folder {
            Some(folder) => {
                let (subject, topic) = self.ensure_share_folder(folder, recipient_owner, sharer).await?;
                (Some(subject), Some(topic))
            }
            None => (None, None),
        };

        let copy = self
            .store
            .create_file(NewFileRecord::share_copy(source, recipient_owner, subject, topic))
            .await?;
        debug!("Created share copy {} of {} for {}", copy.id, source.id, recipient_owner);
        Ok(true)
    }

    /// Find or create the recipient's subject and topic matching the source's
    async fn ensure_share_folder(&self, folder: &ShareFolder, recipient: Owner, sharer: Owner) -> AnyResult<(Uuid, Uuid)> {
        let subject = match self.store.find_subject_by_name(recipient, &folder.subject_name).await? {
            Some(subject) => subject,
            None => {
                let sharer_id = sharer.id().to_string();
                let code = format!("{}-{}", folder.subject_code, &sharer_id[..8]);
                self.store
                    .create_subject(NewSubject {
                        name: folder.subject_name.clone(),
                        code,
                        owner: recipient,
                    })
                    .await?
            }
        };

        let topic_id = match subject.topic_by_name(&folder.topic_name) {
            Some(topic) => topic.id,
            None => {
                self.store
                    .create_topic(subject.id, &folder.topic_name, folder.topic_description.as_deref())
                    .await?
                    .id
            }
        };

        Ok((subject.id, topic_id))
    }

    pub async fn share_with_group(&self, file_id: &str, group_id: &str, sharer: Owner) -> Result<FileRecord, FileError> {
        let id = parse_id(file_id)?;
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(FileError::InvalidInput("group_id is required".to_string()));
        }
        self.owned_file(id, sharer).await?;

        let record = self
            .store
            .add_file_to_group(id, group_id)
            .await?
            .ok_or(FileError::NotFound("File"))?;
        info!("File {} shared with group {} by {}", id, group_id, sharer);
        Ok(record)
    }

    pub async fn list_shared_with_group(&self, group_id: &str) -> Result<Vec<FileRecord>, FileError> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(FileError::InvalidInput("group_id is required".to_string()));
        }
        Ok(self.store.list_files_shared_with_group(group_id).await?)
    }

    pub async fn get_summary(&self, file_id: &str, requester: Owner) -> Result<String, FileError> {
        let id = parse_id(file_id)?;
        let record = self.owned_file(id, requester).await?;

        if let Some(summary) = record.cached_summary() {
            debug!("Returning cached summary for file {}", id);
            return Ok(summary.to_string());
        }

        let principal = self.load_principal(requester).await?;
        let access_token = principal.access_token().ok_or_else(FileError::missing_credential)?;

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| FileError::DownloadFailed(format!("could not prepare temp directory: {}", e)))?;
        let temp_path = self.temp_dir.join(format!("summary-{}-{}", id, Uuid::new_v4()));

        let downloaded = match self.cloud.download(&record.remote_id, access_token, &temp_path).await {
            Ok(()) => tokio::fs::read(&temp_path).await.map_err(|e| FileError::DownloadFailed(e.to_string())),
            Err(e) => Err(FileError::DownloadFailed(e.to_string())),
        };
        remove_temp_file(&temp_path).await;
        let data = downloaded?;

        let summary = self
            .classifier
            .summarize(&data, &record.mime_type)
            .await
            .map_err(|e| FileError::SummarizationFailed(e.to_string()))?;

        self.store.set_file_summary(id, &summary).await?;
        info!("Generated summary for file {}", id);
        Ok(summary)
    }

    async fn owned_file(&self, id: Uuid, requester: Owner) -> Result<FileRecord, FileError> {
        self.store
            .get_file(id)
            .await?
            .filter(|record| record.is_owned_by(requester))
            .ok_or(FileError::NotFound("File"))
    }

    async fn load_principal(&self, owner: Owner) -> Result<Principal, FileError> {
        self.store
            .get_principal(owner)
            .await?
            .ok_or_else(FileError::missing_credential)
    }
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
    }
}

async fn remove_temp_files(files: &[UploadedFile]) {
    for file in files {
        remove_temp_file(&file.temp_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_undefined() {
        assert!(matches!(parse_id("undefined"), Err(FileError::InvalidId)));
    }

    #[test]
    fn test_parse_id_garbage() {
        assert!(matches!(parse_id("not-a-uuid"), Err(FileError::InvalidInput(_))));
        assert!(matches!(parse_id(""), Err(FileError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_id_valid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&format!(" {} ", id)).unwrap(), id);
    }

    #[test]
    fn test_email_pattern() {
        assert!(EMAIL_REGEX.is_match("student@school.edu"));
        assert!(!EMAIL_REGEX.is_match("not an email"));
        assert!(!EMAIL_REGEX.is_match("missing@tld"));
    }
}
