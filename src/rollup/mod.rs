use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::models::session::{LiveSession, SessionId};
use crate::db::models::tally::Metric;
use crate::db::repositories::ledger::LedgerRepository;
use crate::live::aggregator::CountMap;
use crate::state::Services;

pub type RollupResult<T> = core::result::Result<T, RollupErr>;

#[derive(Debug, Error)]
pub enum RollupErr {
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub struct WindowRanking {
    pub gifts: Vec<(String, i64)>,
    pub likes: Vec<(String, i64)>,
}

/// Interval overlap against `[start, end]`, treating an open session as
/// extending to now. A "fully inside" test would drop boundary-straddling
/// broadcasts and always drop the in-progress one.
pub fn overlaps(session: &LiveSession, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    session.started_at <= end && session.ended_at.is_none_or(|ended| ended >= start)
}

/// Ranked totals over an arbitrary window: ledger tallies of every
/// overlapping session, plus the open session's in-memory counts merged
/// additively on top. The open session has no ledger rows until it flushes,
/// so the merge never double counts; the snapshot is served by the tracker
/// task itself, so it cannot interleave with a flush either.
#[instrument(skip(services))]
pub async fn compute_window(
    services: &Services,
    community: &CommunityId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> RollupResult<WindowRanking> {
    let ledger = LedgerRepository::new(&services.pool);

    let sessions = ledger.sessions_for(community).await?;
    let selected: Vec<SessionId> = sessions
        .iter()
        .filter(|s| overlaps(s, start, end))
        .map(|s| s.id.clone())
        .collect();

    tracing::debug!(
        total = sessions.len(),
        selected = selected.len(),
        "sessions in window"
    );

    let mut gifts = CountMap::default();
    for row in ledger.sum_by_metric(&selected, Metric::Gift).await? {
        gifts.add(&row.handle, row.total);
    }

    let mut likes = CountMap::default();
    for row in ledger.sum_by_metric(&selected, Metric::Like).await? {
        likes.add(&row.handle, row.total);
    }

    if let Some(acc) = services.trackers.snapshot(community).await {
        // same overlap rule as the ledger sessions (open ⇒ still running)
        if acc.started_at <= end {
            for (handle, count) in acc.gifts.counts() {
                gifts.add(handle, *count);
            }
            for (handle, count) in acc.likes.counts() {
                likes.add(handle, *count);
            }
        }
    }

    Ok(WindowRanking {
        gifts: gifts.ranked(),
        likes: likes.ranked(),
    })
}
