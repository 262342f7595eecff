use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chat::ChatPort;
use crate::live::tracker::Trackers;
use crate::ranks::Rank;
use crate::render::BoardRenderer;

/// Shared handles threaded through the pipeline: pool, outbound
/// collaborators and the per-community tracker registry. Everything here is
/// cheap to clone through the `Arc` wrapper in which it travels.
pub struct Services {
    pub pool: SqlitePool,
    pub chat: Arc<dyn ChatPort>,
    pub renderer: Arc<dyn BoardRenderer>,
    pub trackers: Trackers,
    pub ladder: &'static [Rank],
    pub gift_xp: i64,
    pub connect_prompt: String,
    pub default_timezone: String,
    pub probe_base: String,
}

#[cfg(test)]
impl Services {
    pub fn for_tests(pool: SqlitePool, chat: Arc<dyn ChatPort>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            chat,
            renderer: Arc::new(crate::render::TextBoard::new()),
            trackers: Trackers::default(),
            ladder: crate::ranks::LADDER,
            gift_xp: 100,
            connect_prompt: "link your handle".to_string(),
            default_timezone: "Etc/UTC".to_string(),
            probe_base: "http://127.0.0.1:1".to_string(),
        })
    }
}
