// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the query engine and its collaborators.

use std::fmt;
use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::PromptdError;

/// Opaque, process-unique identifier of a submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for QueryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for QueryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a query.
///
/// `Queued -> Running -> Completed` is the normal path. `Canceled` is only
/// reached by queries that never left the queue before the store was closed;
/// a query canceled by a caller ends in `Completed` with its cancel flag set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryState {
    Queued,
    Running,
    Completed,
    Canceled,
}

impl QueryState {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Canceled)
    }
}

/// Backend-issued token that resumes a prior conversation.
///
/// The engine never inspects it; it is stored after a successful generation
/// and handed back to the backend verbatim on a later submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationContext(Vec<i64>);

impl ContinuationContext {
    pub fn new(tokens: Vec<i64>) -> Self {
        Self(tokens)
    }

    pub fn tokens(&self) -> &[i64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One incremental piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// `true` on the last fragment of a normally terminated stream.
    pub done: bool,
    /// Continuation token, usually only present when `done` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContinuationContext>,
}

impl Fragment {
    /// A non-final fragment carrying text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
            context: None,
        }
    }

    /// A final fragment, optionally carrying a continuation token.
    pub fn last(text: impl Into<String>, context: Option<ContinuationContext>) -> Self {
        Self {
            text: text.into(),
            done: true,
            context,
        }
    }
}

/// A single generation call against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub context: Option<ContinuationContext>,
}

/// Stream of fragments produced by a backend. An `Err` item ends the stream abnormally.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, PromptdError>> + Send>>;

/// Lifecycle events emitted by the engine for external observers (metrics, storage).
///
/// Observers never influence query semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryEvent {
    Submitted {
        query_id: QueryId,
        prompt_chars: usize,
        /// ISO 8601 timestamp.
        at: String,
    },
    Completed {
        query_id: QueryId,
        fragments: usize,
        canceled: bool,
        error: Option<String>,
        /// ISO 8601 timestamp.
        at: String,
    },
}

impl QueryEvent {
    pub fn query_id(&self) -> &QueryId {
        match self {
            QueryEvent::Submitted { query_id, .. } | QueryEvent::Completed { query_id, .. } => {
                query_id
            }
        }
    }

    /// Short label used for storage and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryEvent::Submitted { .. } => "submitted",
            QueryEvent::Completed { .. } => "completed",
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Backend,
    Storage,
    Observability,
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!QueryState::Queued.is_terminal());
        assert!(!QueryState::Running.is_terminal());
        assert!(QueryState::Completed.is_terminal());
        assert!(QueryState::Canceled.is_terminal());
    }

    #[test]
    fn query_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&QueryState::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(QueryState::Completed.to_string(), "completed");
    }

    #[test]
    fn continuation_context_is_transparent_json_array() {
        let ctx = ContinuationContext::new(vec![1, 2, 3]);
        assert_eq!(serde_json::to_string(&ctx).unwrap(), "[1,2,3]");
        let parsed: ContinuationContext = serde_json::from_str("[4,5]").unwrap();
        assert_eq!(parsed.tokens(), &[4, 5]);
    }

    #[test]
    fn fragment_constructors() {
        let f = Fragment::text("The");
        assert!(!f.done);
        assert!(f.context.is_none());

        let last = Fragment::last("", Some(ContinuationContext::new(vec![7])));
        assert!(last.done);
        assert_eq!(last.context.unwrap().tokens(), &[7]);
    }

    #[test]
    fn query_event_accessors() {
        let event = QueryEvent::Completed {
            query_id: QueryId::from("q1"),
            fragments: 3,
            canceled: true,
            error: None,
            at: "2026-01-01T00:00:00Z".into(),
        };
        assert_eq!(event.query_id().as_str(), "q1");
        assert_eq!(event.kind(), "completed");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "completed");
        assert_eq!(json["canceled"], true);
    }
}
