use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use http::StatusCode;
use tracing::instrument;

use crate::api::server::{AppState, RouteError};
use crate::db::models::community::CommunityId;
use crate::live::LiveEvent;

pub async fn health() -> &'static str {
    "ok"
}

/// Single dispatch point for the external live-source bridge: one typed
/// event in, queued onto the community's tracker.
#[instrument(skip(state, event))]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Path(community): Path<String>,
    Json(event): Json<LiveEvent>,
) -> Result<StatusCode, RouteError> {
    let community = CommunityId::from(community);
    state
        .services
        .trackers
        .dispatch(&state.services, &community, event)
        .await?;

    Ok(StatusCode::ACCEPTED)
}
