use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Owner, PrincipalKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    /// Identifier of the object in the owner's cloud storage
    pub remote_id: String,
    pub view_url: String,
    pub owner_id: Uuid,
    pub owner_kind: PrincipalKind,
    pub linked_subject: Option<Uuid>,
    /// Only meaningful together with `linked_subject`
    pub linked_topic: Option<Uuid>,
    pub shared_with_groups: Vec<String>,
    pub is_deleted: bool,
    pub is_shared: bool,
    pub original_file: Option<Uuid>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn owner(&self) -> Owner {
        Owner::new(self.owner_kind, self.owner_id)
    }

    pub fn is_owned_by(&self, owner: Owner) -> bool {
        self.owner() == owner
    }

    /// Cached summary, ignoring empty strings left by failed runs.
    pub fn cached_summary(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Everything needed to insert a file record; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub remote_id: String,
    pub view_url: String,
    pub owner: Owner,
    pub linked_subject: Option<Uuid>,
    pub linked_topic: Option<Uuid>,
    pub is_shared: bool,
    pub original_file: Option<Uuid>,
}

impl NewFileRecord {
    /// A share-copy of `source` owned by `owner`, pointing at the same remote object.
    pub fn share_copy(source: &FileRecord, owner: Owner, subject: Option<Uuid>, topic: Option<Uuid>) -> Self {
        Self {
            name: source.name.clone(),
            mime_type: source.mime_type.clone(),
            size: source.size,
            remote_id: source.remote_id.clone(),
            view_url: source.view_url.clone(),
            owner,
            linked_subject: subject,
            linked_topic: topic.filter(|_| subject.is_some()),
            is_shared: true,
            original_file: Some(source.id),
        }
    }
}

/// A file received from the client and spooled to the temp directory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub temp_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    pub files: Vec<FileRecord>,
    pub suggested_subject: Option<String>,
    pub suggested_topic: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShareOutcome {
    pub shared: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShareRequest {
    /// User ids or email addresses
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupShareRequest {
    pub group_id: String,
}
