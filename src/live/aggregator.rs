use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::db::models::session::SessionId;
use crate::db::models::tally::Metric;

/// Insertion-ordered running counts for one metric. Ranking ties break by
/// first-seen order, so the order of arrival has to survive accumulation;
/// a plain map drops it.
#[derive(Debug, Clone, Default)]
pub struct CountMap {
    index: HashMap<String, usize>,
    entries: Vec<(String, i64)>,
}

impl CountMap {
    pub fn add(&mut self, handle: &str, by: i64) {
        match self.index.get(handle) {
            Some(&i) => self.entries[i].1 += by,
            None => {
                self.index.insert(handle.to_string(), self.entries.len());
                self.entries.push((handle.to_string(), by));
            }
        }
    }

    /// Counts in first-seen order.
    pub fn counts(&self) -> &[(String, i64)] {
        &self.entries
    }

    /// Descending by count; equal counts keep first-seen order (stable sort).
    pub fn ranked(&self) -> Vec<(String, i64)> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// In-memory state for the currently open session of one community. Exists
/// only between connect and end; discarded wholesale on a fresh connect.
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    pub session_id: SessionId,
    pub host_handle: String,
    pub started_at: DateTime<Utc>,
    pub gifts: CountMap,
    pub likes: CountMap,
    pub comments: CountMap,
}

impl SessionAccumulator {
    pub fn new(session_id: SessionId, host_handle: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            host_handle: host_handle.to_string(),
            started_at,
            gifts: CountMap::default(),
            likes: CountMap::default(),
            comments: CountMap::default(),
        }
    }

    pub fn map(&self, metric: Metric) -> &CountMap {
        match metric {
            Metric::Gift => &self.gifts,
            Metric::Like => &self.likes,
            Metric::Comment => &self.comments,
        }
    }

    /// Flush rows: one (performer, metric, count) per nonzero entry, in
    /// accumulator order, gifts first.
    pub fn tally_rows(&self) -> Vec<(String, Metric, i64)> {
        let mut rows = Vec::new();
        for metric in Metric::ALL {
            for (handle, count) in self.map(metric).counts() {
                if *count != 0 {
                    rows.push((handle.clone(), metric, *count));
                }
            }
        }

        rows
    }
}
