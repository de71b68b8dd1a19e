use anyhow::Result;
use uuid::Uuid;

use super::Database;
use crate::models::{NewSubject, Owner, Subject, Topic};

const SUBJECT_COLUMNS: &str = "id, name, code, owner_id, owner_kind, created_at";

impl Database {
    /// Load the topics (with their ordered file ids) of the given subjects
    async fn load_topics(&self, subject_ids: &[Uuid]) -> Result<Vec<Topic>> {
        let topics = sqlx::query_as::<_, Topic>(
            r#"SELECT t.id, t.subject_id, t.name, t.description,
                      COALESCE(array_agg(tf.file_id ORDER BY tf.added_at)
                               FILTER (WHERE tf.file_id IS NOT NULL), ARRAY[]::uuid[]) AS files
               FROM topics t
               LEFT JOIN topic_files tf ON tf.topic_id = t.id
               WHERE t.subject_id = ANY($1)
               GROUP BY t.id
               ORDER BY t.position, t.name"#,
        )
        .bind(subject_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    async fn with_topics(&self, mut subjects: Vec<Subject>) -> Result<Vec<Subject>> {
        if subjects.is_empty() {
            return Ok(subjects);
        }

        let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
        let topics = self.load_topics(&ids).await?;

        for subject in subjects.iter_mut() {
            subject.topics = topics
                .iter()
                .filter(|t| t.subject_id == subject.id)
                .cloned()
                .collect();
        }
        Ok(subjects)
    }

    pub async fn insert_subject(&self, subject: NewSubject) -> Result<Subject> {
        let sql = format!(
            "INSERT INTO subjects (id, name, code, owner_id, owner_kind) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SUBJECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Subject>(&sql)
            .bind(Uuid::new_v4())
            .bind(&subject.name)
            .bind(&subject.code)
            .bind(subject.owner.id())
            .bind(subject.owner.kind())
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_subject_by_id(&self, id: Uuid) -> Result<Option<Subject>> {
        let sql = format!("SELECT {} FROM subjects WHERE id = $1", SUBJECT_COLUMNS);
        let row = sqlx::query_as::<_, Subject>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(subject) => Ok(self.with_topics(vec![subject]).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn get_subject_by_owner_and_name(&self, owner: Owner, name: &str) -> Result<Option<Subject>> {
        let sql = format!(
            r#"SELECT {} FROM subjects
               WHERE owner_kind = $1 AND owner_id = $2 AND name = $3
               ORDER BY created_at
               LIMIT 1"#,
            SUBJECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Subject>(&sql)
            .bind(owner.kind())
            .bind(owner.id())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(subject) => Ok(self.with_topics(vec![subject]).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn get_subjects_by_owner(&self, owner: Owner) -> Result<Vec<Subject>> {
        let sql = format!(
            "SELECT {} FROM subjects WHERE owner_kind = $1 AND owner_id = $2 ORDER BY name",
            SUBJECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Subject>(&sql)
            .bind(owner.kind())
            .bind(owner.id())
            .fetch_all(&self.pool)
            .await?;
        self.with_topics(rows).await
    }

    pub async fn insert_topic(&self, subject_id: Uuid, name: &str, description: Option<&str>) -> Result<Topic> {
        let topic = sqlx::query_as::<_, Topic>(
            r#"INSERT INTO topics (id, subject_id, name, description, position)
               SELECT $1, $2, $3, $4, COALESCE(MAX(position) + 1, 0) FROM topics WHERE subject_id = $2
               RETURNING id, subject_id, name, description, ARRAY[]::uuid[] AS files"#,
        )
        .bind(Uuid::new_v4())
        .bind(subject_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(topic)
    }
}
