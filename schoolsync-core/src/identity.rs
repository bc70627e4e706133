//! Authenticated session identity.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Parent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role and identifying IDs of the signed-in user.
///
/// Supplied by the auth layer. Any change to a value of this type (role,
/// class set, child set) means the session needs a new subscription profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SessionIdentity {
    Student {
        student_id: String,
        #[serde(default)]
        class_id: Option<String>,
    },
    Teacher {
        teacher_id: String,
        school_id: String,
        #[serde(default)]
        class_ids: Vec<String>,
    },
    Parent {
        parent_id: String,
        #[serde(default)]
        child_ids: Vec<String>,
    },
    Admin {
        admin_id: String,
        school_id: String,
    },
}

impl SessionIdentity {
    pub fn role(&self) -> Role {
        match self {
            Self::Student { .. } => Role::Student,
            Self::Teacher { .. } => Role::Teacher,
            Self::Parent { .. } => Role::Parent,
            Self::Admin { .. } => Role::Admin,
        }
    }

    /// The identifier the session is keyed on.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Student { student_id, .. } => student_id,
            Self::Teacher { teacher_id, .. } => teacher_id,
            Self::Parent { parent_id, .. } => parent_id,
            Self::Admin { admin_id, .. } => admin_id,
        }
    }
}
