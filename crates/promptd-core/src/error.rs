// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for promptd.

use thiserror::Error;

use crate::types::QueryId;

/// The primary error type used across promptd crates.
///
/// Lock poisoning inside the query store has no variant; it panics.
#[derive(Debug, Error)]
pub enum PromptdError {
    /// Configuration errors (invalid TOML, bad values, unusable endpoints).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors (database open, migration, insert failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The generation backend failed or produced a malformed fragment.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport errors (bind failure, server crash).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No query with this id was ever submitted.
    #[error("query not found: {id}")]
    QueryNotFound { id: QueryId },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PromptdError {
    /// Shorthand for a backend error without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` if this is a [`PromptdError::QueryNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::QueryNotFound { .. })
    }
}
