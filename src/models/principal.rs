use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which collection a principal lives in.
///
/// Serialized exactly as the role tag stored on file records ("User"/"Teacher").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "principal_kind")]
pub enum PrincipalKind {
    User,
    Teacher,
}

impl PrincipalKind {
    pub fn table(&self) -> &'static str {
        match self {
            PrincipalKind::User => "users",
            PrincipalKind::Teacher => "teachers",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKind::User => write!(f, "User"),
            PrincipalKind::Teacher => write!(f, "Teacher"),
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "student" => Ok(PrincipalKind::User),
            "teacher" => Ok(PrincipalKind::Teacher),
            other => Err(anyhow::anyhow!("Unknown principal kind: {}", other)),
        }
    }
}

/// Owner of a record: exactly one user or one teacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Owner {
    User(Uuid),
    Teacher(Uuid),
}

impl Owner {
    pub fn new(kind: PrincipalKind, id: Uuid) -> Self {
        match kind {
            PrincipalKind::User => Owner::User(id),
            PrincipalKind::Teacher => Owner::Teacher(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Owner::User(id) | Owner::Teacher(id) => *id,
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        match self {
            Owner::User(_) => PrincipalKind::User,
            Owner::Teacher(_) => PrincipalKind::Teacher,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub kind: PrincipalKind,
    pub name: String,
    pub email: String,
    pub google_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: String,
    /// Users only; always empty for teachers.
    pub friends: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn owner(&self) -> Owner {
        Owner::new(self.kind, self.id)
    }

    /// Access token, if one is stored and non-empty.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Profile and tokens obtained from the identity provider during sign-in.
#[derive(Debug, Clone)]
pub struct PrincipalProfile {
    pub name: String,
    pub email: String,
    pub google_id: String,
    pub access_token: String,
    /// Google only returns a refresh token on the consent screen; `None` keeps the stored one.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrincipalResponse {
    pub id: Uuid,
    pub kind: PrincipalKind,
    pub name: String,
    pub email: String,
    pub role: String,
    pub friends: Vec<Uuid>,
    pub has_drive_access: bool,
}

impl From<Principal> for PrincipalResponse {
    fn from(principal: Principal) -> Self {
        let has_drive_access = principal.access_token().is_some();
        Self {
            id: principal.id,
            kind: principal.kind,
            name: principal.name,
            email: principal.email,
            role: principal.role,
            friends: principal.friends,
            has_drive_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_round_trips_kind_and_id() {
        let id = Uuid::new_v4();
        let owner = Owner::new(PrincipalKind::Teacher, id);
        assert_eq!(owner, Owner::Teacher(id));
        assert_eq!(owner.kind(), PrincipalKind::Teacher);
        assert_eq!(owner.id(), id);
    }

    #[test]
    fn test_principal_kind_parsing() {
        assert_eq!("user".parse::<PrincipalKind>().unwrap(), PrincipalKind::User);
        assert_eq!("Teacher".parse::<PrincipalKind>().unwrap(), PrincipalKind::Teacher);
        assert!("admin".parse::<PrincipalKind>().is_err());
    }

    #[test]
    fn test_role_tag_is_capitalized() {
        assert_eq!(PrincipalKind::User.to_string(), "User");
        assert_eq!(PrincipalKind::Teacher.to_string(), "Teacher");
        assert_eq!(serde_json::to_value(PrincipalKind::Teacher).unwrap(), "Teacher");
    }
}
