use serde::{Deserialize, Serialize};

/// Durable, store-enforced authorization category. Also reused as the
/// session-local "view as" value, which is a display override only and
/// never a security boundary.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hr,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hr => "hr",
            Role::Employee => "employee",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "hr" => Some(Role::Hr),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    /// The other role, used by the view switcher.
    pub fn flipped(&self) -> Role {
        match self {
            Role::Hr => Role::Employee,
            Role::Employee => Role::Hr,
        }
    }
}
