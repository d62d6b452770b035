use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Current layout of the persisted session record.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Parent,
    Counselor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Parent => "parent",
            Role::Counselor => "counselor",
        }
    }

    /// Roles allowed to approve or reject movement passes.
    pub fn can_approve_passes(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin | Role::Counselor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            "parent" => Ok(Role::Parent),
            "counselor" => Ok(Role::Counselor),
            other => Err(format!("unknown role {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub interests: Vec<String>,
    pub academic_goals: Vec<String>,
    pub language_preference: String,
    pub grade_level: Option<String>,
    pub section: Option<String>,
    pub roll_number: Option<String>,
}

/// Registry entry for a school member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile: Option<UserProfile>,
    /// Set for parents: the student whose data they see.
    pub linked_student: Option<Uuid>,
}

/// What the key-value store holds under `currentUser:<session id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub version: u32,
    pub session_id: Uuid,
    pub user: User,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SessionRecord {
    pub fn new(user: User, now: OffsetDateTime) -> Self {
        Self {
            version: SESSION_SCHEMA_VERSION,
            session_id: Uuid::new_v4(),
            user,
            created_at: now,
            updated_at: now,
        }
    }
}
