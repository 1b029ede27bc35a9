// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token authentication for the query API.
//!
//! The token is read from `Authorization: Bearer <token>`. WebSocket clients
//! that cannot set headers may pass `?access_token=<token>` instead. When no
//! token is configured every request is let through; the server only allows
//! that on a loopback listener.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. `None` disables authentication (loopback only).
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

fn query_token(request: &Request) -> Option<&str> {
    request.uri().query()?.split('&').find_map(|pair| {
        pair.strip_prefix("access_token=")
    })
}

/// Middleware that rejects requests without the configured bearer token.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.bearer_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let header_token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let presented = header_token.or_else(|| query_token(&request));
    if presented == Some(expected) {
        return Ok(next.run(request).await);
    }

    tracing::debug!(path = %request.uri().path(), "request rejected: missing or wrong bearer token");
    Err(StatusCode::UNAUTHORIZED)
}
