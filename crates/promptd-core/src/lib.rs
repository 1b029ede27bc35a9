// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for promptd.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types shared by the query engine and its collaborators (backend,
//! storage, transport). Backend adapters implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::PromptdError;
pub use types::{
    AdapterType, ContinuationContext, Fragment, FragmentStream, GenerationRequest, HealthStatus,
    QueryEvent, QueryId, QueryState,
};

pub use traits::{GenerationBackend, PluginAdapter};
