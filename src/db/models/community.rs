use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tracking domain: a single chat guild, live source and report channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct CommunityId(pub String);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommunityConfig {
    pub id: CommunityId,
    pub source_handle: Option<String>,
    pub report_channel: Option<String>,
    pub timezone: String,
    pub weekly_day: i64,
    pub weekly_hour: i64,
    pub weekly_minute: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommunityConfig {
    /// Fresh config for a community seen for the first time. Weekly default
    /// matches the original deployment: Saturday 19:00.
    pub fn new(id: CommunityId, timezone: &str) -> Self {
        Self {
            id,
            source_handle: None,
            report_channel: None,
            timezone: timezone.to_string(),
            weekly_day: 6,
            weekly_hour: 19,
            weekly_minute: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

impl From<String> for CommunityId {
    fn from(value: String) -> Self {
        CommunityId(value)
    }
}

impl From<&str> for CommunityId {
    fn from(value: &str) -> Self {
        CommunityId(value.to_string())
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
