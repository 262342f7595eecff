use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::{health, ingest_event};
use crate::api::middleware::verify_internal_ident;
use crate::live::tracker::TrackerErr;
use crate::state::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub internal_token: String,
}

pub fn app(state: Arc<AppState>) -> Router {
    let ingest_routes = Router::new()
        .route("/ingest/{community}", post(ingest_event))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_internal_ident,
        ));

    Router::new()
        .merge(ingest_routes)
        //
        // keep-alive surface for the uptime pinger
        .route("/", get(health))
        .route("/health", get(health))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(middleware::from_fn(log_route_errors))
        .with_state(state)
}

/// Route-handler errors surface through response extensions for tracing.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[instrument(skip(state, tx, rx))]
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
    tx: UnboundedSender<SocketAddr>,
    mut rx: UnboundedReceiver<SocketAddr>,
) -> Result<Vec<JoinHandle<()>>, RouteError> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    let bound = listener.local_addr()?;

    let router = app(state);
    let server_handle = tokio::task::spawn(async move {
        _ = tx.send(bound);
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = ?e, "api server exited");
        }
    });

    let logging_handle = tokio::task::spawn(async move {
        if let Some(addr) = rx.recv().await {
            tracing::info!(
                server_url = &format!("http://127.0.0.1:{}", addr.port()),
                "server ready"
            );
        }
    });

    Ok(vec![server_handle, logging_handle])
}

#[allow(dead_code)]
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    TrackerError(#[from] TrackerErr),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    AuthError(StatusCode),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match &self {
            RouteError::TrackerError(err) => match err {
                TrackerErr::MissingSourceHandle(_) | TrackerErr::MissingReportChannel(_) => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            },

            RouteError::IoError(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),

            RouteError::AuthError(status) => (
                status.to_owned(),
                String::from("invalid authorization header"),
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}
