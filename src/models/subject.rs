use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Owner, PrincipalKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Topic {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// File record ids, in the order they were linked
    pub files: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub owner_id: Uuid,
    pub owner_kind: PrincipalKind,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub topics: Vec<Topic>,
}

impl Subject {
    pub fn owner(&self) -> Owner {
        Owner::new(self.owner_kind, self.owner_id)
    }

    pub fn topic(&self, topic_id: Uuid) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == topic_id)
    }

    pub fn topic_by_name(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub name: String,
    pub code: String,
    pub owner: Owner,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubject {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTopic {
    pub name: String,
    pub description: Option<String>,
}
