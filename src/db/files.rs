use anyhow::Result;
use uuid::Uuid;

use super::Database;
use crate::models::{FileRecord, NewFileRecord, Owner};

const FILE_COLUMNS: &str = r#"id, name, mime_type, size, remote_id, view_url, owner_id, owner_kind,
    linked_subject, linked_topic, shared_with_groups, is_deleted, is_shared,
    original_file, summary, created_at, updated_at"#;

impl Database {
    /// Insert a file row and, if it is linked to a topic, its topic membership in one transaction
    pub async fn insert_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        let sql = format!(
            r#"INSERT INTO files (id, name, mime_type, size, remote_id, view_url, owner_id, owner_kind,
                   linked_subject, linked_topic, is_shared, original_file)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               RETURNING {}"#,
            FILE_COLUMNS
        );

        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&file.name)
            .bind(&file.mime_type)
            .bind(file.size)
            .bind(&file.remote_id)
            .bind(&file.view_url)
            .bind(file.owner.id())
            .bind(file.owner.kind())
            .bind(file.linked_subject)
            .bind(file.linked_topic)
            .bind(file.is_shared)
            .bind(file.original_file)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(topic_id) = record.linked_topic {
            sqlx::query("INSERT INTO topic_files (topic_id, file_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(topic_id)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_file_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS);
        self.with_retry(|| async {
            let row = sqlx::query_as::<_, FileRecord>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
        .await
    }

    pub async fn get_files_by_owner(&self, owner: Owner, deleted: bool) -> Result<Vec<FileRecord>> {
        let sql = format!(
            r#"SELECT {} FROM files
               WHERE owner_kind = $1 AND owner_id = $2 AND is_deleted = $3
               ORDER BY created_at DESC"#,
            FILE_COLUMNS
        );
        self.with_retry(|| async {
            let rows = sqlx::query_as::<_, FileRecord>(&sql)
                .bind(owner.kind())
                .bind(owner.id())
                .bind(deleted)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        })
        .await
    }

    pub async fn get_files_by_group(&self, group_id: &str) -> Result<Vec<FileRecord>> {
        let sql = format!(
            r#"SELECT {} FROM files
               WHERE $1 = ANY(shared_with_groups) AND NOT is_deleted
               ORDER BY created_at DESC"#,
            FILE_COLUMNS
        );
        self.with_retry(|| async {
            let rows = sqlx::query_as::<_, FileRecord>(&sql)
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        })
        .await
    }

    pub async fn update_file_deleted(&self, id: Uuid, deleted: bool) -> Result<Option<FileRecord>> {
        let sql = format!(
            "UPDATE files SET is_deleted = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            FILE_COLUMNS
        );
        let row = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .bind(deleted)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn trash_files_by_owner(&self, owner: Owner) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE files SET is_deleted = TRUE, updated_at = NOW()
               WHERE owner_kind = $1 AND owner_id = $2 AND NOT is_deleted"#,
        )
        .bind(owner.kind())
        .bind(owner.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a file row together with its topic membership
    pub async fn remove_file(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM topic_files WHERE file_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_file_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        sqlx::query("UPDATE files SET summary = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(summary)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_file_group(&self, id: Uuid, group_id: &str) -> Result<Option<FileRecord>> {
        let sql = format!(
            r#"UPDATE files
               SET shared_with_groups = array_append(shared_with_groups, $2), updated_at = NOW()
               WHERE id = $1 AND NOT ($2 = ANY(shared_with_groups))
               RETURNING {}"#,
            FILE_COLUMNS
        );
        let updated = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => Ok(Some(record)),
            // already shared with the group, or no such file
            None => self.get_file_by_id(id).await,
        }
    }
}
