// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use promptd_core::{GenerationBackend, PromptdError};
use promptd_engine::IngestionFacade;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::sse;
use crate::ws;

/// Renders the Prometheus exposition text.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    /// Daemon name reported by `/health`.
    pub name: String,
    /// Backend probed by `/health`, when wired in.
    pub backend: Option<Arc<dyn GenerationBackend>>,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<MetricsRender>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub facade: IngestionFacade,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// How often SSE streams poll query status.
    pub sse_poll_interval: Duration,
}

/// Listener settings (mirrors `[server]` from the config file).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the application router.
///
/// - `GET /health`, `GET /metrics`: public
/// - `POST /v1/queries`, `GET /v1/queries/{id}`, `POST /v1/queries/{id}/cancel`,
///   `GET /v1/queries/{id}/events`, `GET /ws`: bearer auth when configured
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health + metrics for supervisors and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/queries", post(handlers::post_query))
        .route("/v1/queries/{id}", get(handlers::get_query))
        .route("/v1/queries/{id}/cancel", post(handlers::cancel_query))
        .route("/v1/queries/{id}/events", get(sse::query_events))
        .route("/ws", get(ws::ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind to the configured address and serve until `shutdown` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), PromptdError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PromptdError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");
    serve(listener, state, shutdown).await
}

/// Refuse to expose an unauthenticated API beyond the loopback interface.
fn check_exposure(addr: SocketAddr, auth: &AuthConfig) -> Result<(), PromptdError> {
    if auth.bearer_token.is_some() {
        return Ok(());
    }
    if !addr.ip().is_loopback() {
        return Err(PromptdError::Config(format!(
            "server.bearer_token is required when listening on non-loopback address {addr}"
        )));
    }
    tracing::warn!("no bearer token configured, the query API is open to local clients");
    Ok(())
}

/// Serve on an already-bound listener until `shutdown` fires.
///
/// Fails without serving when no bearer token is set and the listener is not
/// bound to a loopback address.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), PromptdError> {
    let addr = listener.local_addr().map_err(|e| PromptdError::Transport {
        message: format!("failed to read gateway address: {e}"),
        source: Some(Box::new(e)),
    })?;
    check_exposure(addr, &state.auth)?;

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PromptdError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}
