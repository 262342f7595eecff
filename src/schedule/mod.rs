use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::community::{CommunityConfig, CommunityId};
use crate::db::repositories::community::CommunityRepository;
use crate::db::repositories::marker::MarkerRepository;
use crate::live::{probe, tracker};
use crate::report::{self, ReportErr, SORE_FINGER_ROLE};
use crate::rollup::{self, RollupErr};
use crate::state::Services;

pub type ScheduleResult<T> = core::result::Result<T, ScheduleErr>;

#[derive(Debug, Error)]
pub enum ScheduleErr {
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    RollupError(#[from] RollupErr),

    #[error(transparent)]
    ReportError(#[from] ReportErr),
}

/// Exact minute-equality check in the community's local time. A tick that
/// misses the configured minute (downtime spanning the boundary) skips that
/// period's report until the next cadence; there is no catch-up.
pub fn weekly_due(now: &DateTime<Tz>, cfg: &CommunityConfig) -> bool {
    i64::from(now.weekday().number_from_monday()) == cfg.weekly_day
        && i64::from(now.hour()) == cfg.weekly_hour
        && i64::from(now.minute()) == cfg.weekly_minute
}

/// First of the month at the configured hour/minute.
pub fn monthly_due(now: &DateTime<Tz>, cfg: &CommunityConfig) -> bool {
    now.day() == 1
        && i64::from(now.hour()) == cfg.weekly_hour
        && i64::from(now.minute()) == cfg.weekly_minute
}

pub fn year_month(now: &DateTime<Tz>) -> String {
    now.format("%Y-%m").to_string()
}

/// Minute tick driving every community's calendar predicates plus the
/// auto-start probe.
pub async fn run(services: Arc<Services>) {
    tracing::info!("report scheduler started");
    let mut tick = tokio::time::interval(StdDuration::from_secs(60));

    loop {
        tick.tick().await;
        if let Err(e) = sweep(&services).await {
            tracing::error!(error = ?e, "scheduler sweep failure");
        }
    }
}

#[instrument(skip(services))]
pub async fn sweep(services: &Arc<Services>) -> ScheduleResult<()> {
    let configs = CommunityRepository::new(&services.pool).all().await?;

    for cfg in configs {
        let Ok(tz) = cfg
            .timezone
            .parse::<Tz>()
            .or_else(|_| services.default_timezone.parse::<Tz>())
        else {
            tracing::warn!(community = %cfg.id, timezone = %cfg.timezone, "unparseable timezone, community skipped");
            continue;
        };
        let now_local = Utc::now().with_timezone(&tz);

        if weekly_due(&now_local, &cfg) {
            if let Err(e) = post_weekly(services, &cfg.id).await {
                tracing::error!(error = ?e, community = %cfg.id, "weekly report failure");
            }
        }

        if monthly_due(&now_local, &cfg) {
            if let Err(e) = post_monthly(services, &cfg.id, &year_month(&now_local)).await {
                tracing::error!(error = ?e, community = %cfg.id, "monthly report failure");
            }
        }

        if let Some(handle) = cfg.source_handle.as_deref() {
            if !services.trackers.is_tracking(&cfg.id).await
                && probe::is_live(&services.probe_base, handle).await
            {
                tracing::info!(community = %cfg.id, handle, "source live, auto-starting tracking");
                if let Err(e) = tracker::start_tracking(services, &cfg.id).await {
                    tracing::warn!(error = ?e, community = %cfg.id, "auto-start refused");
                }
            }
        }
    }

    Ok(())
}

/// Seven-day window ending now, plus the sore-finger rotation for the top
/// liker and the link-your-handle nudge.
#[instrument(skip(services))]
pub async fn post_weekly(services: &Arc<Services>, community: &CommunityId) -> ScheduleResult<()> {
    let end = Utc::now();
    let ranking = rollup::compute_window(services, community, end - Duration::days(7), end).await?;

    report::post_board(
        services,
        community,
        "**Weekly Summary** — left: top gifters • right: top tappers",
        &ranking.gifts,
        &ranking.likes,
    )
    .await?;

    let cfg = report::config_for(services, community).await?;
    if let Some(channel) = cfg.report_channel.as_deref() {
        if let Err(e) = services
            .chat
            .post_message(channel, &services.connect_prompt)
            .await
        {
            tracing::warn!(error = ?e, "connect prompt post failed");
        }

        if let Some((top_liker, _)) = ranking.likes.first() {
            match report::rotate_role_to_handle(services, community, SORE_FINGER_ROLE, top_liker)
                .await
            {
                Ok(true) => {
                    let resolved =
                        report::resolve_names(services, community, &[(top_liker.clone(), 0)])
                            .await;
                    let display = &resolved[0].0;
                    if let Err(e) = services
                        .chat
                        .post_message(channel, &format!("🖐️ {display} now has sore fingers!"))
                        .await
                    {
                        tracing::warn!(error = ?e, "sore finger announcement failed");
                    }
                }
                Ok(false) => (),
                Err(e) => tracing::warn!(error = ?e, "sore finger rotation failed"),
            }
        }
    }

    Ok(())
}

/// All-time board, fired once per calendar month. The marker is written
/// before the report body: a failure after marking burns the month rather
/// than risking a duplicate post on the next matching tick.
#[instrument(skip(services))]
pub async fn post_monthly(
    services: &Arc<Services>,
    community: &CommunityId,
    year_month: &str,
) -> ScheduleResult<bool> {
    let markers = MarkerRepository::new(&services.pool);
    if markers.exists(community, year_month).await? {
        tracing::debug!(year_month, "monthly report already posted, skipping");
        return Ok(false);
    }
    markers.insert(community, year_month).await?;

    let ranking = rollup::compute_window(
        services,
        community,
        DateTime::UNIX_EPOCH,
        Utc::now(),
    )
    .await?;

    report::post_board(
        services,
        community,
        "**All-Time Board** — left: top gifters • right: top tappers",
        &ranking.gifts,
        &ranking.likes,
    )
    .await?;

    Ok(true)
}
