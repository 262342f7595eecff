use serde::Deserialize;

pub mod aggregator;
pub mod probe;
pub mod tracker;

/// Typed event stream emitted by the live-source bridge for one community.
/// Everything the pipeline consumes arrives through this enum; the wire
/// shape matches the ingest route body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Broadcast came up; opens a session for the configured host.
    Connect { host: String },
    Gift {
        performer: String,
        #[serde(default)]
        repeat_count: Option<i64>,
        #[serde(default)]
        diamond_value: Option<i64>,
    },
    Like {
        performer: String,
        #[serde(default)]
        like_count: Option<i64>,
    },
    Comment { performer: String },
    /// Broadcast ended; flushes and reports.
    End,
}
