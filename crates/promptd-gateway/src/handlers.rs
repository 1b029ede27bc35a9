// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the query API.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use promptd_core::{ContinuationContext, HealthStatus, QueryId};
use promptd_engine::{IngestionFacade, StoreStats};

use crate::server::GatewayState;

/// Acknowledgement text returned by a successful submission.
pub const QUEUED_MESSAGE: &str = "Query added to the queue";

/// Request body for `POST /v1/queries`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Prompt text.
    pub message: String,
    /// Continuation context from an earlier query's status.
    #[serde(default)]
    pub context: Option<ContinuationContext>,
}

/// Response body for `POST /v1/queries`.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub query_id: QueryId,
    pub status: String,
}

/// Response body for `POST /v1/queries/{id}/cancel`.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub query_id: QueryId,
    /// Whether this request set the cancel flag.
    pub canceled: bool,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub name: String,
    pub version: String,
    pub uptime_secs: u64,
    pub queue: StoreStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<HealthStatus>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Validate and queue a submission. Shared by REST and WebSocket paths.
pub(crate) fn submit(
    facade: &IngestionFacade,
    request: SubmitRequest,
) -> Result<SubmitResponse, ErrorResponse> {
    if request.message.trim().is_empty() {
        return Err(ErrorResponse {
            error: "message must not be empty".to_string(),
        });
    }
    let query_id = facade.submit(request.message, request.context);
    tracing::debug!(query_id = %query_id, "query submitted via gateway");
    Ok(SubmitResponse {
        query_id,
        status: QUEUED_MESSAGE.to_string(),
    })
}

/// POST /v1/queries
pub async fn post_query(
    State(state): State<GatewayState>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    match submit(&state.facade, body) {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    }
}

/// GET /v1/queries/{id}
pub async fn get_query(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.facade.status(&QueryId::from(id)) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) if e.is_not_found() => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /v1/queries/{id}/cancel
pub async fn cancel_query(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    let query_id = QueryId::from(id);
    let canceled = state.facade.cancel(&query_id);
    Json(CancelResponse { query_id, canceled })
}

/// GET /health
///
/// Reports `degraded` when the backend probe is not healthy; the engine
/// still accepts submissions in that case.
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let backend = match &state.health.backend {
        Some(backend) => Some(
            backend
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
        ),
        None => None,
    };
    let status = match backend {
        None | Some(HealthStatus::Healthy) => "ok",
        Some(_) => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        name: state.health.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        queue: state.facade.stats(),
        backend,
    })
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics are disabled"),
    }
}
