use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::api::server::{AppState, RouteError};
use crate::chat::discord::Discord;
use crate::db::repositories::community::CommunityRepository;
use crate::live::tracker::Trackers;
use crate::render::TextBoard;
use crate::report::{SORE_FINGER_ROLE, TOP_GIFTER_ROLE};
use crate::state::Services;
use crate::util::env::{EnvErr, Var};

mod api;
mod chat;
mod db;
mod live;
mod ranks;
mod render;
mod report;
mod rollup;
mod schedule;
mod state;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Db(#[from] db::DbErr),

    #[error(transparent)]
    Route(#[from] RouteError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    util::trace::init();
    tracing::info!("starting tok-board");

    let pool = db::connect(var!(Var::DatabaseUrl).await?).await?;

    let gift_xp = parse_var(Var::GiftXp, "GIFT_XP").await?;
    let port: u16 = parse_var(Var::ApiPort, "API_PORT").await?;

    let services = Arc::new(Services {
        pool: pool.clone(),
        chat: Arc::new(Discord::new(var!(Var::BotToken).await?)),
        renderer: Arc::new(TextBoard::new()),
        trackers: Trackers::default(),
        ladder: ranks::LADDER,
        gift_xp,
        connect_prompt: var!(Var::ConnectPrompt).await?.to_string(),
        default_timezone: var!(Var::DefaultTimezone).await?.to_string(),
        probe_base: var!(Var::SourceStatusUrl).await?.to_string(),
    });

    bootstrap_roles(&services).await;

    let state = Arc::new(AppState {
        services: services.clone(),
        internal_token: var!(Var::InternalToken).await?.to_string(),
    });

    let (tx_server_ready, rx_server_ready) =
        tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    let mut handles = api::server::start_server(state, port, tx_server_ready, rx_server_ready)
        .await?;
    handles.push(tokio::spawn(schedule::run(services.clone())));

    _ = join_all(handles).await;
    Ok(())
}

async fn parse_var<T>(var: Var, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var!(var).await?;
    raw.parse::<T>()
        .map_err(|e| EnvErr::Malformed(name.to_string(), e.to_string()).into())
}

/// Make sure the single-holder roles exist in every configured community.
/// Best-effort: a failing guild only logs.
async fn bootstrap_roles(services: &Arc<Services>) {
    let configs = match CommunityRepository::new(&services.pool).all().await {
        Ok(configs) => configs,
        Err(e) => {
            tracing::warn!(error = ?e, "config scan failed during role bootstrap");
            return;
        }
    };

    for cfg in configs {
        for role in [TOP_GIFTER_ROLE, SORE_FINGER_ROLE] {
            if let Err(e) = services.chat.ensure_role(&cfg.id, role).await {
                tracing::warn!(error = ?e, community = %cfg.id, role, "role bootstrap failure");
            }
        }
    }
}
