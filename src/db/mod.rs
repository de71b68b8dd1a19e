//! Document store: persistence for file records, principals and subjects.
//!
//! Handlers depend on the [`DocumentStore`] trait. [`Database`] is the Postgres
//! implementation the server runs on; [`memory::InMemoryStore`] backs the tests.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    FileRecord, NewFileRecord, NewSubject, Owner, Principal, PrincipalKind, PrincipalProfile,
    Subject, Topic,
};

pub mod files;
pub mod memory;
pub mod principals;
pub mod subjects;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a file record. When `linked_topic` is set the record id is appended
    /// to that topic's file list in the same write.
    async fn create_file(&self, file: NewFileRecord) -> Result<FileRecord>;
    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>>;
    /// Records owned by `owner` with the given deletion flag, newest first.
    async fn list_files(&self, owner: Owner, deleted: bool) -> Result<Vec<FileRecord>>;
    async fn list_files_shared_with_group(&self, group_id: &str) -> Result<Vec<FileRecord>>;
    async fn set_file_deleted(&self, id: Uuid, deleted: bool) -> Result<Option<FileRecord>>;
    /// Soft-delete every active record of `owner`; returns how many changed.
    async fn trash_all_files(&self, owner: Owner) -> Result<u64>;
    /// Remove a record and its topic membership. Returns false if it did not exist.
    async fn delete_file(&self, id: Uuid) -> Result<bool>;
    async fn set_file_summary(&self, id: Uuid, summary: &str) -> Result<()>;
    async fn add_file_to_group(&self, id: Uuid, group_id: &str) -> Result<Option<FileRecord>>;

    async fn get_principal(&self, owner: Owner) -> Result<Option<Principal>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Principal>>;
    /// Create or update a principal from a sign-in, matching on google id then email.
    async fn upsert_principal(&self, kind: PrincipalKind, profile: &PrincipalProfile) -> Result<Principal>;
    /// Store refreshed tokens. A `None` refresh token keeps the stored one.
    async fn update_credentials(&self, owner: Owner, access_token: &str, refresh_token: Option<&str>) -> Result<()>;
    /// Add `friend_id` to the user's friend list. Returns false if already present.
    async fn add_friend(&self, user_id: Uuid, friend_id: Uuid) -> Result<bool>;

    async fn create_subject(&self, subject: NewSubject) -> Result<Subject>;
    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>>;
    async fn find_subject_by_name(&self, owner: Owner, name: &str) -> Result<Option<Subject>>;
    async fn list_subjects(&self, owner: Owner) -> Result<Vec<Subject>>;
    async fn create_topic(&self, subject_id: Uuid, name: &str, description: Option<&str>) -> Result<Topic>;
}

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::new_with_pool_config(database_url, 20, 2).await
    }

    pub async fn new_with_pool_config(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Run a database operation, retrying a few times on transient connection errors.
    pub async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                    warn!("Transient database error (attempt {}/{}): {}; retrying in {:?}", attempt, MAX_ATTEMPTS, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::PoolTimedOut) | Some(sqlx::Error::Io(_)) | Some(sqlx::Error::PoolClosed)
    )
}

#[async_trait]
impl DocumentStore for Database {
    async fn create_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        self.insert_file(file).await
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        self.get_file_by_id(id).await
    }

    async fn list_files(&self, owner: Owner, deleted: bool) -> Result<Vec<FileRecord>> {
        self.get_files_by_owner(owner, deleted).await
    }

    async fn list_files_shared_with_group(&self, group_id: &str) -> Result<Vec<FileRecord>> {
        self.get_files_by_group(group_id).await
    }

    async fn set_file_deleted(&self, id: Uuid, deleted: bool) -> Result<Option<FileRecord>> {
        self.update_file_deleted(id, deleted).await
    }

    async fn trash_all_files(&self, owner: Owner) -> Result<u64> {
        self.trash_files_by_owner(owner).await
    }

    async fn delete_file(&self, id: Uuid) -> Result<bool> {
        self.remove_file(id).await
    }

    async fn set_file_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        self.update_file_summary(id, summary).await
    }

    async fn add_file_to_group(&self, id: Uuid, group_id: &str) -> Result<Option<FileRecord>> {
        self.append_file_group(id, group_id).await
    }

    async fn get_principal(&self, owner: Owner) -> Result<Option<Principal>> {
        self.get_principal_by_owner(owner).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Principal>> {
        self.get_user_by_email(email).await
    }

    async fn upsert_principal(&self, kind: PrincipalKind, profile: &PrincipalProfile) -> Result<Principal> {
        self.upsert_principal_from_profile(kind, profile).await
    }

    async fn update_credentials(&self, owner: Owner, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.update_principal_tokens(owner, access_token, refresh_token).await
    }

    async fn add_friend(&self, user_id: Uuid, friend_id: Uuid) -> Result<bool> {
        self.append_user_friend(user_id, friend_id).await
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<Subject> {
        self.insert_subject(subject).await
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        self.get_subject_by_id(id).await
    }

    async fn find_subject_by_name(&self, owner: Owner, name: &str) -> Result<Option<Subject>> {
        self.get_subject_by_owner_and_name(owner, name).await
    }

    async fn list_subjects(&self, owner: Owner) -> Result<Vec<Subject>> {
        self.get_subjects_by_owner(owner).await
    }

    async fn create_topic(&self, subject_id: Uuid, name: &str, description: Option<&str>) -> Result<Topic> {
        self.insert_topic(subject_id, name, description).await
    }
}
