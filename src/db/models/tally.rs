use core::fmt;

use serde::{Deserialize, Serialize};

use super::community::CommunityId;
use super::session::SessionId;

/// The three counted event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Gift,
    Like,
    Comment,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Gift, Metric::Like, Metric::Comment];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Metric::Gift => "gift",
            Metric::Like => "like",
            Metric::Comment => "comment",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted per-session per-performer count; written once at flush time,
/// never updated.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TallyRecord {
    pub session_id: SessionId,
    pub community: CommunityId,
    pub performer_handle: String,
    pub metric: String,
    pub count: i64,
}

/// Summed roll-up row for one performer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HandleCount {
    pub handle: String,
    pub total: i64,
}
