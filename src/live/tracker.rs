use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, oneshot};
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::repositories::community::CommunityRepository;
use crate::db::repositories::ledger::LedgerRepository;
use crate::db::repositories::link::LinkRepository;
use crate::live::LiveEvent;
use crate::live::aggregator::SessionAccumulator;
use crate::ranks::RankLadder;
use crate::report;
use crate::state::Services;

pub type TrackerResult<T> = core::result::Result<T, TrackerErr>;

#[derive(Debug, Error)]
pub enum TrackerErr {
    #[error("no live source handle configured for '{0}'")]
    MissingSourceHandle(CommunityId),

    #[error("no report channel configured for '{0}'")]
    MissingReportChannel(CommunityId),

    #[error("tracker for '{0}' is gone")]
    TrackerGone(CommunityId),

    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

#[derive(Debug)]
pub enum TrackerMsg {
    Event(LiveEvent),
    Snapshot(oneshot::Sender<Option<SessionAccumulator>>),
}

#[derive(Debug)]
struct TrackerHandle {
    tx: UnboundedSender<TrackerMsg>,
}

/// Registry of per-community tracker tasks. Each task exclusively owns its
/// community's accumulator; the registry only hands out queue senders, so
/// no lock ever guards the maps themselves.
#[derive(Default)]
pub struct Trackers {
    inner: Mutex<HashMap<CommunityId, TrackerHandle>>,
}

impl Trackers {
    /// Queue an event for the community, spawning its tracker task on first
    /// contact (or after a crash).
    #[instrument(skip(self, services, event))]
    pub async fn dispatch(
        &self,
        services: &Arc<Services>,
        community: &CommunityId,
        event: LiveEvent,
    ) -> TrackerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.get(community).is_some_and(|h| h.tx.is_closed()) {
            tracing::warn!(%community, "tracker task died, respawning");
            inner.remove(community);
        }

        let handle = inner
            .entry(community.clone())
            .or_insert_with(|| spawn_tracker(services, community));

        handle
            .tx
            .send(TrackerMsg::Event(event))
            .map_err(|_| TrackerErr::TrackerGone(community.clone()))
    }

    /// Register a tracker without queueing anything (auto-start path).
    pub async fn ensure(&self, services: &Arc<Services>, community: &CommunityId) {
        let mut inner = self.inner.lock().await;
        inner
            .entry(community.clone())
            .or_insert_with(|| spawn_tracker(services, community));
    }

    /// Copy of the open-session accumulator, served through the tracker's
    /// own queue so it can never race an event handler. `None` when the
    /// community is untracked or between sessions.
    pub async fn snapshot(&self, community: &CommunityId) -> Option<SessionAccumulator> {
        let tx = self.inner.lock().await.get(community)?.tx.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(TrackerMsg::Snapshot(reply_tx)).ok()?;
        reply_rx.await.ok().flatten()
    }

    pub async fn is_tracking(&self, community: &CommunityId) -> bool {
        self.inner
            .lock()
            .await
            .get(community)
            .is_some_and(|h| !h.tx.is_closed())
    }

    /// Drop the community's queue; the task drains in-flight messages and
    /// exits. No new events are dispatched after removal.
    pub async fn stop(&self, community: &CommunityId) {
        if self.inner.lock().await.remove(community).is_some() {
            tracing::info!(%community, "tracking stopped");
        }
    }
}

/// The explicit "start tracking" operation. Config gaps abort without
/// touching state.
#[instrument(skip(services))]
pub async fn start_tracking(
    services: &Arc<Services>,
    community: &CommunityId,
) -> TrackerResult<()> {
    let cfg = CommunityRepository::new(&services.pool)
        .get(community)
        .await?
        .ok_or_else(|| TrackerErr::MissingSourceHandle(community.clone()))?;

    if cfg.source_handle.is_none() {
        return Err(TrackerErr::MissingSourceHandle(community.clone()));
    }
    if cfg.report_channel.is_none() {
        return Err(TrackerErr::MissingReportChannel(community.clone()));
    }

    services.trackers.ensure(services, community).await;
    Ok(())
}

fn spawn_tracker(services: &Arc<Services>, community: &CommunityId) -> TrackerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let services = services.clone();
    let community = community.clone();

    tokio::spawn(async move {
        run(services, community, rx).await;
    });

    TrackerHandle { tx }
}

/// Tracker task body: single consumer of one community's queue. Handlers
/// run to completion before the next message, which is the whole
/// concurrency story for the accumulator.
#[instrument(skip(services, rx))]
async fn run(
    services: Arc<Services>,
    community: CommunityId,
    mut rx: UnboundedReceiver<TrackerMsg>,
) {
    tracing::debug!("tracker task started");
    let mut current: Option<SessionAccumulator> = None;

    while let Some(msg) = rx.recv().await {
        match msg {
            TrackerMsg::Event(event) => {
                if let Err(e) = handle_event(&services, &community, &mut current, event).await {
                    tracing::error!(error = ?e, "event handler failure");
                }
            }

            TrackerMsg::Snapshot(reply) => {
                _ = reply.send(current.clone());
            }
        }
    }

    tracing::debug!("tracker task exiting");
}

async fn handle_event(
    services: &Arc<Services>,
    community: &CommunityId,
    current: &mut Option<SessionAccumulator>,
    event: LiveEvent,
) -> TrackerResult<()> {
    match event {
        LiveEvent::Connect { host } => {
            if let Some(prev) = current.take() {
                // end event never arrived; that session's activity never
                // reaches the ledger
                tracing::warn!(
                    session = %prev.session_id,
                    "discarding unflushed accumulator on reconnect"
                );
            }

            let session = LedgerRepository::new(&services.pool)
                .open_session(community, &host, Utc::now())
                .await?;

            tracing::info!(session = %session.id, host, "session opened");
            announce(
                services,
                community,
                &format!("🟢 tracking started for @{host}"),
            )
            .await;

            *current = Some(SessionAccumulator::new(
                session.id,
                &host,
                session.started_at,
            ));
        }

        LiveEvent::Gift {
            performer,
            repeat_count,
            diamond_value,
        } => {
            let Some(acc) = current.as_mut() else {
                tracing::debug!(performer, "gift outside open session, dropped");
                return Ok(());
            };

            let repeat = repeat_count.filter(|n| *n > 0).unwrap_or(1);
            acc.gifts.add(&performer, repeat);

            let per_gift = diamond_value.filter(|d| *d > 0).unwrap_or(services.gift_xp);
            award_gift_xp(services, community, &performer, repeat * per_gift).await;
        }

        LiveEvent::Like {
            performer,
            like_count,
        } => {
            let Some(acc) = current.as_mut() else {
                tracing::debug!(performer, "like outside open session, dropped");
                return Ok(());
            };

            acc.likes.add(&performer, like_count.filter(|n| *n > 0).unwrap_or(1));
        }

        LiveEvent::Comment { performer } => {
            let Some(acc) = current.as_mut() else {
                tracing::debug!(performer, "comment outside open session, dropped");
                return Ok(());
            };

            acc.comments.add(&performer, 1);
        }

        LiveEvent::End => {
            let Some(acc) = current.take() else {
                tracing::debug!("end without open session, ignored");
                return Ok(());
            };

            flush_and_report(services, community, acc).await;
        }
    }

    Ok(())
}

/// Experience only ever attributes to a linked member; unlinked gifting
/// counts toward the board but earns nothing.
async fn award_gift_xp(
    services: &Arc<Services>,
    community: &CommunityId,
    performer: &str,
    amount: i64,
) {
    let member = match LinkRepository::new(&services.pool)
        .member_for(community, performer)
        .await
    {
        Ok(Some(member)) => member,
        Ok(None) => {
            tracing::debug!(performer, "unlinked performer, no xp attribution");
            return;
        }
        Err(e) => {
            tracing::warn!(error = ?e, performer, "link lookup failed during award");
            return;
        }
    };

    let ladder = RankLadder::new(&services.pool, services.ladder);
    match ladder.award(community, &member, amount).await {
        Ok(Some(up)) => {
            let display = match services.chat.resolve_display_name(community, &member).await {
                Ok(Some(name)) => name,
                _ => format!("@{performer}"),
            };
            announce(
                services,
                community,
                &format!(
                    "📈 {display} ranked up: {} → {} ({} xp)",
                    up.old_rank, up.new_rank, up.total
                ),
            )
            .await;
        }
        Ok(None) => (),
        Err(e) => tracing::warn!(error = ?e, %member, "experience award failed"),
    }
}

/// Session-end path. Ledger writes happen first; the report and role
/// rotation are best-effort; the accumulator was already taken out of the
/// tracker, so it clears no matter what fails below.
async fn flush_and_report(
    services: &Arc<Services>,
    community: &CommunityId,
    acc: SessionAccumulator,
) {
    let ledger = LedgerRepository::new(&services.pool);

    if let Err(e) = ledger.close_session(&acc.session_id, Utc::now()).await {
        tracing::error!(error = ?e, session = %acc.session_id, "session close failure");
    }

    let rows = acc.tally_rows();
    if let Err(e) = ledger.insert_tallies(&acc.session_id, community, &rows).await {
        tracing::error!(
            error = ?e,
            session = %acc.session_id,
            "tally flush failure, session activity lost from ledger"
        );
    }

    if let Err(e) = report::post_live_board(services, community, &acc).await {
        tracing::error!(error = ?e, session = %acc.session_id, "post-live report failure");
    }

    tracing::info!(
        session = %acc.session_id,
        gifters = acc.gifts.len(),
        likers = acc.likes.len(),
        commenters = acc.comments.len(),
        "session flushed"
    );
}

/// Best-effort message to the community's report channel; unconfigured or
/// failing channels only log.
async fn announce(services: &Arc<Services>, community: &CommunityId, text: &str) {
    let channel = match CommunityRepository::new(&services.pool).get(community).await {
        Ok(Some(cfg)) => cfg.report_channel,
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = ?e, "config lookup failed for announcement");
            None
        }
    };

    let Some(channel) = channel else {
        tracing::debug!(text, "no report channel, announcement skipped");
        return;
    };

    if let Err(e) = services.chat.post_message(&channel, text).await {
        tracing::warn!(error = ?e, "announcement failed");
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::chat::testing::{ExplodingChat, RecordingChat};
    use crate::db::models::member::MemberId;
    use crate::db::models::tally::Metric;

    async fn configure(services: &Arc<Services>, id: &str) -> CommunityId {
        let community = CommunityId::from(id);
        let repo = CommunityRepository::new(&services.pool);
        let mut cfg = repo.get_or_default(&community, "Etc/UTC").await.unwrap();
        cfg.source_handle = Some("hostess".to_string());
        cfg.report_channel = Some("chan-9".to_string());
        repo.upsert(&cfg).await.unwrap();
        community
    }

    async fn send(services: &Arc<Services>, community: &CommunityId, event: LiveEvent) {
        services
            .trackers
            .dispatch(services, community, event)
            .await
            .unwrap();
    }

    /// Queue a snapshot after prior events so its reply doubles as a
    /// processing barrier.
    async fn barrier(services: &Arc<Services>, community: &CommunityId) -> Option<SessionAccumulator> {
        services.trackers.snapshot(community).await
    }

    #[tokio::test]
    async fn test_flushed_tallies_equal_event_magnitudes() {
        let pool = crate::db::in_memory().await.unwrap();
        let chat = Arc::new(RecordingChat::default());
        let services = Services::for_tests(pool, chat.clone());
        let community = configure(&services, "guild-1").await;

        send(&services, &community, LiveEvent::Connect { host: "hostess".into() }).await;
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: Some(3), diamond_value: None },
        )
        .await;
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: None, diamond_value: None },
        )
        .await;
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "bob".into(), repeat_count: Some(-2), diamond_value: None },
        )
        .await;
        send(
            &services,
            &community,
            LiveEvent::Like { performer: "carol".into(), like_count: Some(25) },
        )
        .await;
        send(&services, &community, LiveEvent::Comment { performer: "carol".into() }).await;

        let acc = barrier(&services, &community).await.expect("session open");
        let session_id = acc.session_id.clone();
        assert_eq!(acc.gifts.counts(), &[("alice".to_string(), 4), ("bob".to_string(), 1)]);

        send(&services, &community, LiveEvent::End).await;
        assert!(barrier(&services, &community).await.is_none(), "cleared after flush");

        let ledger = LedgerRepository::new(&services.pool);
        let tallies = ledger.tallies_for_session(&session_id).await.unwrap();
        let lookup = |handle: &str, metric: Metric| {
            tallies
                .iter()
                .find(|t| t.performer_handle == handle && t.metric == metric.as_str())
                .map(|t| t.count)
        };

        assert_eq!(lookup("alice", Metric::Gift), Some(4));
        assert_eq!(lookup("bob", Metric::Gift), Some(1), "invalid repeat counts as 1");
        assert_eq!(lookup("carol", Metric::Like), Some(25));
        assert_eq!(lookup("carol", Metric::Comment), Some(1));
        assert_eq!(tallies.len(), 4);

        let sessions = ledger.sessions_for(&community).await.unwrap();
        assert!(!sessions[0].is_open(), "ended_at set at flush");

        // start announcement + board
        assert_eq!(chat.messages.lock().unwrap().len(), 1);
        assert_eq!(chat.boards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_discards_prior_accumulator() {
        let pool = crate::db::in_memory().await.unwrap();
        let services = Services::for_tests(pool, Arc::new(RecordingChat::default()));
        let community = configure(&services, "guild-1").await;

        send(&services, &community, LiveEvent::Connect { host: "hostess".into() }).await;
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: Some(5), diamond_value: None },
        )
        .await;

        // source reconnected without an end event
        send(&services, &community, LiveEvent::Connect { host: "hostess".into() }).await;
        let acc = barrier(&services, &community).await.expect("new session open");
        assert!(acc.gifts.is_empty(), "prior counts discarded, not carried");

        send(&services, &community, LiveEvent::End).await;
        barrier(&services, &community).await;

        // only the second session flushed anything
        let ledger = LedgerRepository::new(&services.pool);
        let sessions = ledger.sessions_for(&community).await.unwrap();
        assert_eq!(sessions.len(), 2);
        let orphaned = sessions.iter().find(|s| s.is_open()).unwrap();
        assert!(
            ledger.tallies_for_session(&orphaned.id).await.unwrap().is_empty(),
            "unflushed session left no tallies"
        );
    }

    #[tokio::test]
    async fn test_gift_xp_attribution_and_rank_up() {
        let pool = crate::db::in_memory().await.unwrap();
        let chat = Arc::new(RecordingChat::default().with_name("m-1", "Alice"));
        let services = Services::for_tests(pool, chat.clone());
        let community = configure(&services, "guild-1").await;

        LinkRepository::new(&services.pool)
            .link(&community, "alice", &MemberId::from("m-1"))
            .await
            .unwrap();

        send(&services, &community, LiveEvent::Connect { host: "hostess".into() }).await;

        // 2 × 700 diamonds = 1400 xp, still Bronze
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: Some(2), diamond_value: Some(700) },
        )
        .await;
        // +200 crosses the 1500 Silver threshold
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: Some(1), diamond_value: Some(200) },
        )
        .await;
        // unlinked performer earns nothing
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "ghost".into(), repeat_count: Some(9), diamond_value: Some(999) },
        )
        .await;
        barrier(&services, &community).await;

        let xp = crate::db::repositories::experience::ExperienceRepository::new(&services.pool)
            .get(&community, &MemberId::from("m-1"))
            .await
            .unwrap();
        assert_eq!(xp, 1_600);

        let messages = chat.messages.lock().unwrap();
        let rank_up = messages
            .iter()
            .find(|(_, text)| text.contains("ranked up"))
            .expect("rank-up announced");
        assert!(rank_up.1.contains("Bronze → Silver"));
        assert!(rank_up.1.contains("Alice"));
    }

    #[tokio::test]
    async fn test_collaborator_failure_never_blocks_the_clear() {
        let pool = crate::db::in_memory().await.unwrap();
        let services = Services::for_tests(pool, Arc::new(ExplodingChat));
        let community = configure(&services, "guild-1").await;

        send(&services, &community, LiveEvent::Connect { host: "hostess".into() }).await;
        send(
            &services,
            &community,
            LiveEvent::Gift { performer: "alice".into(), repeat_count: Some(2), diamond_value: None },
        )
        .await;
        let acc = barrier(&services, &community).await.expect("session open");

        send(&services, &community, LiveEvent::End).await;
        assert!(barrier(&services, &community).await.is_none(), "cleared despite post failure");

        // ledger data survived the collaborator failure
        let tallies = LedgerRepository::new(&services.pool)
            .tallies_for_session(&acc.session_id)
            .await
            .unwrap();
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].count, 2);
    }

    #[tokio::test]
    async fn test_start_tracking_requires_configuration() {
        let pool = crate::db::in_memory().await.unwrap();
        let services = Services::for_tests(pool, Arc::new(RecordingChat::default()));
        let community = CommunityId::from("guild-unconfigured");

        let res = start_tracking(&services, &community).await;
        assert!(matches!(res, Err(TrackerErr::MissingSourceHandle(_))));
        assert!(!services.trackers.is_tracking(&community).await);

        let repo = CommunityRepository::new(&services.pool);
        let mut cfg = repo.get_or_default(&community, "Etc/UTC").await.unwrap();
        cfg.source_handle = Some("hostess".to_string());
        repo.upsert(&cfg).await.unwrap();

        let res = start_tracking(&services, &community).await;
        assert!(matches!(res, Err(TrackerErr::MissingReportChannel(_))));

        cfg.report_channel = Some("chan-9".to_string());
        repo.upsert(&cfg).await.unwrap();
        start_tracking(&services, &community).await.unwrap();
        assert!(services.trackers.is_tracking(&community).await);

        services.trackers.stop(&community).await;
        assert!(!services.trackers.is_tracking(&community).await);
    }
}
