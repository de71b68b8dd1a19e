use anyhow::Result;
use uuid::Uuid;

use super::Database;
use crate::models::{Owner, Principal, PrincipalKind, PrincipalProfile};

/// Users and teachers live in separate tables; both are read into `Principal`.
fn select_principal(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => {
            r#"SELECT id, 'User'::principal_kind AS kind, name, email, google_id, access_token,
                      refresh_token, role, friends, created_at, updated_at
               FROM users"#
        }
        PrincipalKind::Teacher => {
            r#"SELECT id, 'Teacher'::principal_kind AS kind, name, email, google_id, access_token,
                      refresh_token, role, ARRAY[]::uuid[] AS friends, created_at, updated_at
               FROM teachers"#
        }
    }
}

impl Database {
    pub async fn get_principal_by_owner(&self, owner: Owner) -> Result<Option<Principal>> {
        let sql = format!("{} WHERE id = $1", select_principal(owner.kind()));
        self.with_retry(|| async {
            let row = sqlx::query_as::<_, Principal>(&sql)
                .bind(owner.id())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let sql = format!("{} WHERE lower(email) = lower($1)", select_principal(PrincipalKind::User));
        let row = sqlx::query_as::<_, Principal>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_principal_for_profile(&self, kind: PrincipalKind, profile: &PrincipalProfile) -> Result<Option<Principal>> {
        let by_google = format!("{} WHERE google_id = $1", select_principal(kind));
        if let Some(principal) = sqlx::query_as::<_, Principal>(&by_google)
            .bind(&profile.google_id)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Some(principal));
        }

        let by_email = format!("{} WHERE lower(email) = lower($1)", select_principal(kind));
        let row = sqlx::query_as::<_, Principal>(&by_email)
            .bind(&profile.email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn upsert_principal_from_profile(&self, kind: PrincipalKind, profile: &PrincipalProfile) -> Result<Principal> {
        let table = kind.table();

        let id = match self.find_principal_for_profile(kind, profile).await? {
            Some(existing) => {
                let sql = format!(
                    r#"UPDATE {} SET name = $2, google_id = $3, access_token = $4,
                           refresh_token = COALESCE($5, refresh_token), updated_at = NOW()
                       WHERE id = $1"#,
                    table
                );
                sqlx::query(&sql)
                    .bind(existing.id)
                    .bind(&profile.name)
                    .bind(&profile.google_id)
                    .bind(&profile.access_token)
                    .bind(profile.refresh_token.as_deref())
                    .execute(&self.pool)
                    .await?;
                existing.id
            }
            None => {
                let sql = format!(
                    r#"INSERT INTO {} (id, name, email, google_id, access_token, refresh_token)
                       VALUES ($1, $2, $3, $4, $5, $6)"#,
                    table
                );
                let id = Uuid::new_v4();
                sqlx::query(&sql)
                    .bind(id)
                    .bind(&profile.name)
                    .bind(&profile.email)
                    .bind(&profile.google_id)
                    .bind(&profile.access_token)
                    .bind(profile.refresh_token.as_deref())
                    .execute(&self.pool)
                    .await?;
                id
            }
        };

        self.get_principal_by_owner(Owner::new(kind, id))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Principal {} vanished after upsert", id))
    }

    pub async fn update_principal_tokens(&self, owner: Owner, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let sql = format!(
            r#"UPDATE {} SET access_token = $2, refresh_token = COALESCE($3, refresh_token), updated_at = NOW()
               WHERE id = $1"#,
            owner.kind().table()
        );
        sqlx::query(&sql)
            .bind(owner.id())
            .bind(access_token)
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_user_friend(&self, user_id: Uuid, friend_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE users SET friends = array_append(friends, $2), updated_at = NOW()
               WHERE id = $1 AND NOT ($2 = ANY(friends))"#,
        )
        .bind(user_id)
        .bind(friend_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
