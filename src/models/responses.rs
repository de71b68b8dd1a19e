use serde::Serialize;
use utoipa::ToSchema;

use super::{FileRecord, ShareOutcome};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<FileRecord>,
    pub suggested_subject: Option<String>,
    pub suggested_topic: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: ShareOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub message: String,
    pub count: u64,
}
