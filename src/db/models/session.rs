use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::community::CommunityId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SessionId(pub String);

/// One tracked broadcast. `ended_at` stays null while the session is open;
/// at most one open session exists per community.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LiveSession {
    pub id: SessionId,
    pub community: CommunityId,
    pub host_handle: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl LiveSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

impl SessionId {
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
