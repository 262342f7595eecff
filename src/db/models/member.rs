use core::fmt;

use serde::{Deserialize, Serialize};

/// Local chat-platform member id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct MemberId(pub String);

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        MemberId(value)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        MemberId(value.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
