// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the promptd query engine.
//!
//! A thin transport over [`IngestionFacade`](promptd_engine::IngestionFacade):
//! every route maps to `submit`, `status`, or `cancel` and serializes the
//! result. Nothing here waits on generation.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;
pub mod ws;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use promptd_core::{AdapterType, HealthStatus, PluginAdapter, PromptdError};

pub use crate::auth::AuthConfig;
pub use crate::server::{
    GatewayState, HealthState, MetricsRender, ServerConfig, build_router, serve, start_server,
};

/// The gateway as a pluggable transport adapter.
pub struct Gateway {
    config: ServerConfig,
    state: GatewayState,
}

impl Gateway {
    pub fn new(config: ServerConfig, state: GatewayState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), PromptdError> {
        server::start_server(&self.config, self.state.clone(), shutdown).await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("auth", &self.state.auth)
            .finish()
    }
}

#[async_trait]
impl PluginAdapter for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptdError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptdError> {
        Ok(())
    }
}
