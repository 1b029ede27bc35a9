// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread-safe query store: the FIFO of pending work plus the index of every
//! query ever submitted.
//!
//! All state lives behind one mutex, so each operation is atomic with respect
//! to every other. The lock is never held across an `.await`. The worker
//! waits on a [`Notify`] instead of polling.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use promptd_core::{ContinuationContext, PromptdError, QueryEvent, QueryId, QueryState};

use crate::query::{Query, QueryStatus, generate_query_id};

/// Work handed to the worker by [`QueryStore::dequeue`].
#[derive(Debug, Clone, PartialEq)]
pub struct DequeuedQuery {
    pub id: QueryId,
    pub prompt: String,
    pub resume_from: Option<ContinuationContext>,
    /// Cancellation was requested while the query was still queued.
    pub cancel_requested: bool,
}

/// How the worker finished a running query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Continuation context from a normally terminated generation.
    pub continuation: Option<ContinuationContext>,
    /// Failure description when generation stopped abnormally.
    pub error: Option<String>,
}

impl Completion {
    pub fn success(continuation: Option<ContinuationContext>) -> Self {
        Self {
            continuation,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            continuation: None,
            error: Some(error.into()),
        }
    }
}

/// Per-state counts and queue depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub canceled: usize,
    pub total: usize,
    pub queue_depth: usize,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<QueryId>,
    queries: HashMap<QueryId, Query>,
    next_seq: u64,
    closed: bool,
}

/// The single authoritative store of queries.
///
/// Exactly one instance exists per process; it is shared via `Arc` between
/// the ingestion facade and the worker.
pub struct QueryStore {
    inner: Mutex<Inner>,
    available: Notify,
    events: Option<mpsc::UnboundedSender<QueryEvent>>,
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Notify::new(),
            events: None,
        }
    }

    /// A store that reports lifecycle events to `events`.
    ///
    /// Sending never blocks. A dropped receiver is ignored.
    pub fn with_events(events: mpsc::UnboundedSender<QueryEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-mutation; query state can no
        // longer be trusted.
        self.inner
            .lock()
            .expect("query store lock poisoned: a thread panicked while mutating query state")
    }

    fn emit(&self, event: QueryEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Create a `Queued` query, append it to the FIFO, and wake the worker.
    ///
    /// Always succeeds. After [`close`](Self::close) the query is recorded
    /// directly as `Canceled`, since no worker will ever pick it up.
    pub fn enqueue(&self, prompt: String, resume_from: Option<ContinuationContext>) -> QueryId {
        let now = Utc::now();
        let prompt_chars = prompt.chars().count();
        let (id, closed, depth) = {
            let mut inner = self.lock();
            let id = loop {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                let candidate = generate_query_id(&prompt, now, seq);
                if !inner.queries.contains_key(&candidate) {
                    break candidate;
                }
            };
            let mut query = Query::new(id.clone(), prompt, resume_from, now);
            let closed = inner.closed;
            if closed {
                query.state = QueryState::Canceled;
                query.completed_at = Some(now);
            } else {
                inner.pending.push_back(id.clone());
            }
            inner.queries.insert(id.clone(), query);
            (id, closed, inner.pending.len())
        };

        if closed {
            warn!(query_id = %id, "query submitted after shutdown began, marked canceled");
        } else {
            debug!(query_id = %id, prompt_chars, queue_depth = depth, "query queued");
            self.available.notify_one();
        }

        #[cfg(feature = "prometheus")]
        {
            promptd_prometheus::record_submitted();
            promptd_prometheus::set_queue_depth(depth as f64);
        }

        self.emit(QueryEvent::Submitted {
            query_id: id.clone(),
            prompt_chars,
            at: now.to_rfc3339(),
        });
        if closed {
            self.emit(QueryEvent::Completed {
                query_id: id.clone(),
                fragments: 0,
                canceled: true,
                error: None,
                at: now.to_rfc3339(),
            });
        }
        id
    }

    /// Wait for the next queued query, mark it `Running`, and hand it out.
    ///
    /// Returns `None` once the store is closed. The pop and the state change
    /// happen under one lock acquisition, so no other caller can observe a
    /// dequeued query that is still `Queued`.
    pub async fn dequeue(&self) -> Option<DequeuedQuery> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking, so a notification between the check
            // and the await is not lost.
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(job) = Self::start_next(&mut inner) {
                    #[cfg(feature = "prometheus")]
                    promptd_prometheus::set_queue_depth(inner.pending.len() as f64);
                    return Some(job);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Non-blocking variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<DequeuedQuery> {
        let mut inner = self.lock();
        Self::start_next(&mut inner)
    }

    fn start_next(inner: &mut Inner) -> Option<DequeuedQuery> {
        while let Some(id) = inner.pending.pop_front() {
            let Some(query) = inner.queries.get_mut(&id) else {
                continue;
            };
            if query.state != QueryState::Queued {
                continue;
            }
            query.state = QueryState::Running;
            query.started_at = Some(Utc::now());
            return Some(DequeuedQuery {
                id,
                prompt: query.prompt.clone(),
                resume_from: query.resume_from.clone(),
                cancel_requested: query.cancel_requested,
            });
        }
        None
    }

    /// A consistent snapshot of one query.
    pub fn lookup(&self, id: &QueryId) -> Result<QueryStatus, PromptdError> {
        self.lock()
            .queries
            .get(id)
            .map(Query::snapshot)
            .ok_or_else(|| PromptdError::QueryNotFound { id: id.clone() })
    }

    /// Ask the worker to stop a query.
    ///
    /// Returns `true` only when this call set the flag: unknown ids, queries
    /// already in a terminal state, and repeated requests all return `false`.
    pub fn request_cancel(&self, id: &QueryId) -> bool {
        let changed = {
            let mut inner = self.lock();
            match inner.queries.get_mut(id) {
                Some(q) if !q.state.is_terminal() && !q.cancel_requested => {
                    q.cancel_requested = true;
                    true
                }
                _ => false,
            }
        };
        debug!(query_id = %id, changed, "cancel requested");
        changed
    }

    /// Whether cancellation has been requested for `id`.
    ///
    /// Unknown ids report `true` so a caller holding a stale id stops work.
    pub fn is_cancel_requested(&self, id: &QueryId) -> bool {
        self.lock()
            .queries
            .get(id)
            .is_none_or(|q| q.cancel_requested)
    }

    /// Append one fragment to a running query's partial responses.
    ///
    /// Returns the query's cancel flag as observed in the same critical
    /// section, so the worker learns about cancellation without a second
    /// lock round trip. Fragments for queries that are not running are
    /// dropped and reported as canceled.
    pub fn append_fragment(&self, id: &QueryId, text: String) -> bool {
        let mut inner = self.lock();
        match inner.queries.get_mut(id) {
            Some(q) if q.state == QueryState::Running => {
                q.partial_responses.push(text);
                #[cfg(feature = "prometheus")]
                promptd_prometheus::record_fragment();
                q.cancel_requested
            }
            _ => {
                warn!(query_id = %id, "fragment for a query that is not running was dropped");
                true
            }
        }
    }

    /// Move a running query to `Completed`.
    ///
    /// Returns the final snapshot, or `None` when the query was not running.
    pub fn complete(&self, id: &QueryId, completion: Completion) -> Option<QueryStatus> {
        let now = Utc::now();
        let status = {
            let mut inner = self.lock();
            let query = inner.queries.get_mut(id)?;
            if query.state != QueryState::Running {
                return None;
            }
            query.state = QueryState::Completed;
            query.completed_at = Some(now);
            query.continuation = completion.continuation;
            query.error = completion.error;
            query.snapshot()
        };

        #[cfg(feature = "prometheus")]
        {
            use promptd_prometheus::Outcome;
            let outcome = if status.error.is_some() {
                Outcome::Failed
            } else if status.canceled_requested {
                Outcome::Canceled
            } else {
                Outcome::Completed
            };
            promptd_prometheus::record_completed(outcome);
        }

        self.emit(QueryEvent::Completed {
            query_id: id.clone(),
            fragments: status.partial_responses.len(),
            canceled: status.canceled_requested,
            error: status.error.clone(),
            at: now.to_rfc3339(),
        });
        Some(status)
    }

    /// Stop accepting work for the worker and wake it so it can exit.
    ///
    /// Queries still `Queued` become `Canceled`; their ids are returned in
    /// FIFO order. A running query is left to the worker. Calling this twice
    /// is harmless.
    pub fn close(&self) -> Vec<QueryId> {
        let now = Utc::now();
        let canceled: Vec<QueryId> = {
            let mut inner = self.lock();
            inner.closed = true;
            let pending: Vec<QueryId> = inner.pending.drain(..).collect();
            pending
                .into_iter()
                .filter(|id| match inner.queries.get_mut(id) {
                    Some(q) if q.state == QueryState::Queued => {
                        q.state = QueryState::Canceled;
                        q.completed_at = Some(now);
                        true
                    }
                    _ => false,
                })
                .collect()
        };
        self.available.notify_waiters();

        #[cfg(feature = "prometheus")]
        {
            promptd_prometheus::set_queue_depth(0.0);
            for _ in &canceled {
                promptd_prometheus::record_completed(promptd_prometheus::Outcome::Canceled);
            }
        }

        for id in &canceled {
            self.emit(QueryEvent::Completed {
                query_id: id.clone(),
                fragments: 0,
                canceled: true,
                error: None,
                at: now.to_rfc3339(),
            });
        }
        if !canceled.is_empty() {
            warn!(count = canceled.len(), "queued queries canceled at shutdown");
        }
        canceled
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        let mut stats = StoreStats {
            total: inner.queries.len(),
            queue_depth: inner.pending.len(),
            ..StoreStats::default()
        };
        for q in inner.queries.values() {
            match q.state {
                QueryState::Queued => stats.queued += 1,
                QueryState::Running => stats.running += 1,
                QueryState::Completed => stats.completed += 1,
                QueryState::Canceled => stats.canceled += 1,
            }
        }
        stats
    }
}
