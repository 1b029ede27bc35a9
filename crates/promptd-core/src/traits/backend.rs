// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation backend trait (Ollama and compatible streaming services).

use async_trait::async_trait;

use crate::error::PromptdError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{FragmentStream, GenerationRequest};

/// A streaming text-generation service.
///
/// The backend supports one concurrent generation; the engine serializes all
/// calls through a single worker. Dropping the returned stream must stop the
/// generation (or at least stop transferring fragments).
#[async_trait]
pub trait GenerationBackend: PluginAdapter {
    /// Starts a generation and returns its fragment stream.
    ///
    /// An `Err` here means the generation never started. Errors yielded by the
    /// stream end it abnormally; a fragment with `done == true` ends it normally.
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, PromptdError>;
}
