use thiserror::Error;
use tracing::instrument;

use crate::chat::ChatErr;
use crate::db::models::community::{CommunityConfig, CommunityId};
use crate::db::repositories::community::CommunityRepository;
use crate::db::repositories::link::LinkRepository;
use crate::live::aggregator::SessionAccumulator;
use crate::render::RenderErr;
use crate::state::Services;

/// Rotated to the top gifter after every live.
pub const TOP_GIFTER_ROLE: &str = "Top Gifter";
/// Rotated to the weekly top liker.
pub const SORE_FINGER_ROLE: &str = "Sore Finger";

pub type ReportResult<T> = core::result::Result<T, ReportErr>;

#[derive(Debug, Error)]
pub enum ReportErr {
    #[error("no report channel configured for '{0}'")]
    MissingReportChannel(CommunityId),

    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    ChatError(#[from] ChatErr),

    #[error(transparent)]
    RenderError(#[from] RenderErr),
}

/// Swap external handles for linked members' guild display names; anything
/// unlinked or unresolvable falls back to the `@handle` form. Lookup
/// failures degrade to the fallback rather than dropping the row.
#[instrument(skip(services, pairs), fields(pair_count = pairs.len()))]
pub async fn resolve_names(
    services: &Services,
    community: &CommunityId,
    pairs: &[(String, i64)],
) -> Vec<(String, i64)> {
    let links = LinkRepository::new(&services.pool);
    let mut resolved = Vec::with_capacity(pairs.len());

    for (handle, score) in pairs {
        let fallback = format!("@{handle}");
        let display = match links.member_for(community, handle).await {
            Ok(Some(member)) => match services.chat.resolve_display_name(community, &member).await
            {
                Ok(Some(name)) => name,
                Ok(None) => fallback,
                Err(e) => {
                    tracing::warn!(error = ?e, %member, "display name lookup failed");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(error = ?e, handle, "link lookup failed");
                fallback
            }
        };

        resolved.push((display, *score));
    }

    resolved
}

pub async fn config_for(
    services: &Services,
    community: &CommunityId,
) -> ReportResult<CommunityConfig> {
    CommunityRepository::new(&services.pool)
        .get(community)
        .await?
        .ok_or_else(|| ReportErr::MissingReportChannel(community.clone()))
}

/// Renders the two ranked columns and posts them to the community's report
/// channel. Empty rankings still post an empty board.
#[instrument(skip(services, heading, gifts, likes))]
pub async fn post_board(
    services: &Services,
    community: &CommunityId,
    heading: &str,
    gifts: &[(String, i64)],
    likes: &[(String, i64)],
) -> ReportResult<()> {
    let cfg = config_for(services, community).await?;
    let channel = cfg
        .report_channel
        .ok_or_else(|| ReportErr::MissingReportChannel(community.clone()))?;

    let left = resolve_names(services, community, gifts).await;
    let right = resolve_names(services, community, likes).await;

    let image = services.renderer.render(&left, &right)?;
    services
        .chat
        .post_board(&channel, heading, image, services.renderer.file_name())
        .await?;

    Ok(())
}

/// Resolves a handle to its linked member and rotates the named
/// single-holder role onto them. Returns false (without touching anything)
/// when the handle is unlinked.
#[instrument(skip(services))]
pub async fn rotate_role_to_handle(
    services: &Services,
    community: &CommunityId,
    role_name: &str,
    handle: &str,
) -> ReportResult<bool> {
    let links = LinkRepository::new(&services.pool);
    let Some(member) = links.member_for(community, handle).await? else {
        tracing::debug!(handle, role_name, "top performer unlinked, skipping role");
        return Ok(false);
    };

    services
        .chat
        .rotate_single_holder(community, role_name, &member)
        .await?;

    Ok(true)
}

/// End-of-session board: rankings from the just-flushed accumulator, then
/// the top gifter role rotation. Role/post failures are the caller's to log;
/// nothing here blocks the accumulator clear.
#[instrument(skip(services, acc))]
pub async fn post_live_board(
    services: &Services,
    community: &CommunityId,
    acc: &SessionAccumulator,
) -> ReportResult<()> {
    let gifts = acc.gifts.ranked();
    let likes = acc.likes.ranked();

    post_board(
        services,
        community,
        "**Last LIVE** — left: top gifters • right: top tappers",
        &gifts,
        &likes,
    )
    .await?;

    if let Some((top_handle, _)) = gifts.first() {
        rotate_role_to_handle(services, community, TOP_GIFTER_ROLE, top_handle).await?;
    }

    Ok(())
}
