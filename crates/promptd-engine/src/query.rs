// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-query record and its status snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use promptd_core::{ContinuationContext, QueryId, QueryState};

/// Number of digest bytes kept in a query id (24 hex characters).
const ID_BYTES: usize = 12;

/// Derive a query id from the prompt, the current time, and a store-local
/// sequence number.
///
/// The sequence number makes ids distinct even for identical prompts
/// submitted within the same clock tick; the store still checks for
/// collisions before accepting an id.
pub(crate) fn generate_query_id(prompt: &str, now: DateTime<Utc>, seq: u64) -> QueryId {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hasher.finalize();
    QueryId(hex::encode(&digest[..ID_BYTES]))
}

/// One submitted prompt and everything the engine knows about it.
#[derive(Debug, Clone)]
pub(crate) struct Query {
    pub(crate) id: QueryId,
    pub(crate) prompt: String,
    /// Context supplied by the caller to resume an earlier conversation.
    pub(crate) resume_from: Option<ContinuationContext>,
    pub(crate) partial_responses: Vec<String>,
    /// Context returned by the backend after a normally terminated generation.
    pub(crate) continuation: Option<ContinuationContext>,
    pub(crate) state: QueryState,
    pub(crate) cancel_requested: bool,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl Query {
    pub(crate) fn new(
        id: QueryId,
        prompt: String,
        resume_from: Option<ContinuationContext>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            prompt,
            resume_from,
            partial_responses: Vec::new(),
            continuation: None,
            state: QueryState::Queued,
            cancel_requested: false,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn snapshot(&self) -> QueryStatus {
        QueryStatus {
            query_id: self.id.clone(),
            state: self.state,
            completed: self.state.is_terminal(),
            canceled_requested: self.cancel_requested,
            full_response: self.partial_responses.concat(),
            partial_responses: self.partial_responses.clone(),
            continuation_context: self.continuation.clone(),
            error: self.error.clone(),
            created_at: self.created_at.to_rfc3339(),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// A consistent, point-in-time view of one query.
///
/// Produced under the store lock, so a reader never observes a torn update
/// (for example a state of `Completed` with a fragment still missing).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStatus {
    pub query_id: QueryId,
    pub state: QueryState,
    /// `true` once the query reached a terminal state.
    pub completed: bool,
    pub canceled_requested: bool,
    pub partial_responses: Vec<String>,
    /// All partial responses concatenated in order.
    pub full_response: String,
    pub continuation_context: Option<ContinuationContext>,
    /// Why generation stopped early, when it failed. Informational only.
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}
