//! In-process document store. Same semantics as the Postgres store, kept in a
//! mutex-guarded struct; used by the test suite.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::DocumentStore;
use crate::models::{
    FileRecord, NewFileRecord, NewSubject, Owner, Principal, PrincipalKind, PrincipalProfile,
    Subject, Topic,
};

#[derive(Default)]
struct MemoryState {
    /// Insertion order
    files: Vec<FileRecord>,
    principals: HashMap<Owner, Principal>,
    subjects: Vec<Subject>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Insert a principal directly, bypassing the sign-in flow.
    pub fn insert_principal(&self, principal: Principal) -> Result<()> {
        self.state()?.principals.insert(principal.owner(), principal);
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.state().map(|s| s.files.len()).unwrap_or(0)
    }

    pub fn all_files(&self) -> Vec<FileRecord> {
        self.state().map(|s| s.files.clone()).unwrap_or_default()
    }
}

fn find_topic_mut(subjects: &mut [Subject], topic_id: Uuid) -> Option<&mut Topic> {
    subjects
        .iter_mut()
        .flat_map(|s| s.topics.iter_mut())
        .find(|t| t.id == topic_id)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        let mut state = self.state()?;
        let now = Utc::now();
        let record = FileRecord {
            id: Uuid::new_v4(),
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            remote_id: file.remote_id,
            view_url: file.view_url,
            owner_id: file.owner.id(),
            owner_kind: file.owner.kind(),
            linked_subject: file.linked_subject,
            linked_topic: file.linked_topic,
            shared_with_groups: Vec::new(),
            is_deleted: false,
            is_shared: file.is_shared,
            original_file: file.original_file,
            summary: None,
            created_at: now,
            updated_at: now,
        };

        if let Some(topic_id) = record.linked_topic {
            let topic = find_topic_mut(&mut state.subjects, topic_id)
                .ok_or_else(|| anyhow!("topic {} does not exist", topic_id))?;
            if !topic.files.contains(&record.id) {
                topic.files.push(record.id);
            }
        }

        state.files.push(record.clone());
        Ok(record)
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.state()?.files.iter().find(|f| f.id == id).cloned())
    }

    async fn list_files(&self, owner: Owner, deleted: bool) -> Result<Vec<FileRecord>> {
        Ok(self
            .state()?
            .files
            .iter()
            .rev()
            .filter(|f| f.is_owned_by(owner) && f.is_deleted == deleted)
            .cloned()
            .collect())
    }

    async fn list_files_shared_with_group(&self, group_id: &str) -> Result<Vec<FileRecord>> {
        Ok(self
            .state()?
            .files
            .iter()
            .rev()
            .filter(|f| !f.is_deleted && f.shared_with_groups.iter().any(|g| g == group_id))
            .cloned()
            .collect())
    }

    async fn set_file_deleted(&self, id: Uuid, deleted: bool) -> Result<Option<FileRecord>> {
        let mut state = self.state()?;
        Ok(state.files.iter_mut().find(|f| f.id == id).map(|f| {
            f.is_deleted = deleted;
            f.updated_at = Utc::now();
            f.clone()
        }))
    }

    async fn trash_all_files(&self, owner: Owner) -> Result<u64> {
        let mut state = self.state()?;
        let now = Utc::now();
        let mut count = 0;
        for file in state.files.iter_mut().filter(|f| f.is_owned_by(owner) && !f.is_deleted) {
            file.is_deleted = true;
            file.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_file(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        let Some(index) = state.files.iter().position(|f| f.id == id) else {
            return Ok(false);
        };
        let removed = state.files.remove(index);

        if let Some(topic_id) = removed.linked_topic {
            if let Some(topic) = find_topic_mut(&mut state.subjects, topic_id) {
                topic.files.retain(|f| *f != id);
            }
        }
        Ok(true)
    }

    async fn set_file_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        let mut state = self.state()?;
        if let Some(file) = state.files.iter_mut().find(|f| f.id == id) {
            file.summary = Some(summary.to_string());
            file.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn add_file_to_group(&self, id: Uuid, group_id: &str) -> Result<Option<FileRecord>> {
        let mut state = self.state()?;
        Ok(state.files.iter_mut().find(|f| f.id == id).map(|f| {
            if !f.shared_with_groups.iter().any(|g| g == group_id) {
                f.shared_with_groups.push(group_id.to_string());
                f.updated_at = Utc::now();
            }
            f.clone()
        }))
    }

    async fn get_principal(&self, owner: Owner) -> Result<Option<Principal>> {
        Ok(self.state()?.principals.get(&owner).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let email = email.trim();
        Ok(self
            .state()?
            .principals
            .values()
            .find(|p| p.kind == PrincipalKind::User && p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_principal(&self, kind: PrincipalKind, profile: &PrincipalProfile) -> Result<Principal> {
        let mut state = self.state()?;
        let now = Utc::now();

        let existing = state
            .principals
            .values_mut()
            .filter(|p| p.kind == kind)
            .find(|p| {
                p.google_id.as_deref() == Some(profile.google_id.as_str())
                    || p.email.eq_ignore_ascii_case(&profile.email)
            });

        if let Some(principal) = existing {
            principal.name = profile.name.clone();
            principal.google_id = Some(profile.google_id.clone());
            principal.access_token = Some(profile.access_token.clone());
            if let Some(refresh) = &profile.refresh_token {
                principal.refresh_token = Some(refresh.clone());
            }
            principal.updated_at = now;
            return Ok(principal.clone());
        }

        let principal = Principal {
            id: Uuid::new_v4(),
            kind,
            name: profile.name.clone(),
            email: profile.email.clone(),
            google_id: Some(profile.google_id.clone()),
            access_token: Some(profile.access_token.clone()),
            refresh_token: profile.refresh_token.clone(),
            role: match kind {
                PrincipalKind::User => "student".to_string(),
                PrincipalKind::Teacher => "teacher".to_string(),
            },
            friends: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.principals.insert(principal.owner(), principal.clone());
        Ok(principal)
    }

    async fn update_credentials(&self, owner: Owner, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let mut state = self.state()?;
        if let Some(principal) = state.principals.get_mut(&owner) {
            principal.access_token = Some(access_token.to_string());
            if let Some(refresh) = refresh_token {
                principal.refresh_token = Some(refresh.to_string());
            }
            principal.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn add_friend(&self, user_id: Uuid, friend_id: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        match state.principals.get_mut(&Owner::User(user_id)) {
            Some(user) if !user.friends.contains(&friend_id) => {
                user.friends.push(friend_id);
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<Subject> {
        let record = Subject {
            id: Uuid::new_v4(),
            name: subject.name,
            code: subject.code,
            owner_id: subject.owner.id(),
            owner_kind: subject.owner.kind(),
            created_at: Utc::now(),
            topics: Vec::new(),
        };
        self.state()?.subjects.push(record.clone());
        Ok(record)
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        Ok(self.state()?.subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn find_subject_by_name(&self, owner: Owner, name: &str) -> Result<Option<Subject>> {
        Ok(self
            .state()?
            .subjects
            .iter()
            .find(|s| s.owner() == owner && s.name == name)
            .cloned())
    }

    async fn list_subjects(&self, owner: Owner) -> Result<Vec<Subject>> {
        let mut subjects: Vec<Subject> = self
            .state()?
            .subjects
            .iter()
            .filter(|s| s.owner() == owner)
            .cloned()
            .collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }

    async fn create_topic(&self, subject_id: Uuid, name: &str, description: Option<&str>) -> Result<Topic> {
        let mut state = self.state()?;
        let subject = state
            .subjects
            .iter_mut()
            .find(|s| s.id == subject_id)
            .ok_or_else(|| anyhow!("subject {} does not exist", subject_id))?;

        let topic = Topic {
            id: Uuid::new_v4(),
            subject_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            files: Vec::new(),
        };
        subject.topics.push(topic.clone());
        Ok(topic)
    }
}
