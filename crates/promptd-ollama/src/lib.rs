// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama generation backend for promptd.
//!
//! Streams `/api/generate` responses as [`Fragment`](promptd_core::Fragment)s
//! and passes continuation contexts through verbatim.

pub mod client;
pub mod ndjson;
pub mod types;

use async_trait::async_trait;
use tracing::debug;

use promptd_config::model::BackendConfig;
use promptd_core::{
    AdapterType, FragmentStream, GenerationBackend, GenerationRequest, HealthStatus,
    PluginAdapter, PromptdError,
};

use crate::client::OllamaClient;
use crate::types::GenerateRequest;

/// [`GenerationBackend`] backed by an Ollama-compatible server.
pub struct OllamaBackend {
    client: OllamaClient,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, PromptdError> {
        Ok(Self {
            client: OllamaClient::new(config)?,
            model: config.model.clone(),
        })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

/// Whether a tag such as `llama3:latest` names `model`.
fn tag_matches(tag: &str, model: &str) -> bool {
    tag == model || tag.split_once(':').is_some_and(|(name, _)| name == model)
}

#[async_trait]
impl PluginAdapter for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptdError> {
        match self.client.list_models().await {
            Ok(models) if models.iter().any(|m| tag_matches(m, &self.model)) => {
                Ok(HealthStatus::Healthy)
            }
            Ok(_) => Ok(HealthStatus::Degraded(format!(
                "model '{}' is not available on {}",
                self.model,
                self.client.base_url()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), PromptdError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, PromptdError> {
        debug!(
            model = %request.model,
            resumed = request.context.is_some(),
            "starting generation"
        );
        let body = GenerateRequest {
            model: request.model,
            prompt: request.prompt,
            stream: true,
            context: request.context.map(|c| c.tokens().to_vec()),
        };
        self.client.generate(&body).await
    }
}
