// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The caller-facing entry points: submit, status, cancel.

use std::sync::Arc;

use promptd_core::{ContinuationContext, PromptdError, QueryId};

use crate::query::QueryStatus;
use crate::store::{QueryStore, StoreStats};

/// Thin, stateless adapter over the shared [`QueryStore`].
///
/// Cloning is cheap; every clone talks to the same store. Every operation
/// returns without waiting on generation.
#[derive(Clone)]
pub struct IngestionFacade {
    store: Arc<QueryStore>,
}

impl IngestionFacade {
    pub fn new(store: Arc<QueryStore>) -> Self {
        Self { store }
    }

    /// Queue a prompt and return its id immediately.
    ///
    /// `context` resumes a conversation from a previous query's
    /// `continuation_context`.
    pub fn submit(&self, prompt: impl Into<String>, context: Option<ContinuationContext>) -> QueryId {
        self.store.enqueue(prompt.into(), context)
    }

    /// Snapshot of a query's progress.
    pub fn status(&self, id: &QueryId) -> Result<QueryStatus, PromptdError> {
        self.store.lookup(id)
    }

    /// Request cancellation. `false` for unknown, finished, or already
    /// canceled queries.
    pub fn cancel(&self, id: &QueryId) -> bool {
        self.store.request_cancel(id)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn store(&self) -> &Arc<QueryStore> {
        &self.store
    }
}
