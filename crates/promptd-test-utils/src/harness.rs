// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` wires one `QueryStore`, a running `Worker`, and an
//! `IngestionFacade` to a `MockBackend`, the same way the daemon wires them
//! to a real backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use promptd_core::{PromptdError, QueryEvent, QueryId};
use promptd_engine::{IngestionFacade, QueryStatus, QueryStore, Worker};

use crate::mock_backend::{MockBackend, ScriptStep};

/// How long `wait_*` helpers poll before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    scripts: Vec<Vec<ScriptStep>>,
    gated: bool,
    model: String,
    capture_events: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
            gated: false,
            model: "mock-model".to_string(),
            capture_events: false,
        }
    }

    /// Scripts replayed by the mock backend, one per query.
    pub fn with_scripts(mut self, scripts: Vec<Vec<ScriptStep>>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Deliver fragments only as the test releases them.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Keep the receiving end of the store's event channel.
    pub fn capture_events(mut self) -> Self {
        self.capture_events = true;
        self
    }

    /// Build the harness and start its worker. Must run inside a tokio runtime.
    pub fn build(self) -> TestHarness {
        let mut backend = MockBackend::with_scripts(self.scripts);
        if self.gated {
            backend = backend.gated();
        }
        let backend = Arc::new(backend);

        let (store, events) = if self.capture_events {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueryStore::with_events(tx), Some(rx))
        } else {
            (QueryStore::new(), None)
        };
        let store = Arc::new(store);

        let shutdown = CancellationToken::new();
        let worker = Worker::new(
            store.clone(),
            backend.clone(),
            self.model,
            shutdown.clone(),
        )
        .spawn();

        TestHarness {
            facade: IngestionFacade::new(store.clone()),
            store,
            backend,
            events,
            shutdown,
            worker: Some(worker),
        }
    }
}

/// A running engine backed by a mock backend.
pub struct TestHarness {
    pub facade: IngestionFacade,
    pub store: Arc<QueryStore>,
    pub backend: Arc<MockBackend>,
    /// Present when built with [`TestHarnessBuilder::capture_events`].
    pub events: Option<mpsc::UnboundedReceiver<QueryEvent>>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Poll `status` until `predicate` holds.
    pub async fn wait_until<F>(&self, id: &QueryId, predicate: F) -> Result<QueryStatus, PromptdError>
    where
        F: Fn(&QueryStatus) -> bool,
    {
        let poll = async {
            loop {
                match self.facade.status(id) {
                    Ok(status) if predicate(&status) => return Ok(status),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, poll)
            .await
            .map_err(|_| PromptdError::Timeout {
                duration: WAIT_TIMEOUT,
            })?
    }

    /// Wait until the query reaches a terminal state.
    pub async fn wait_for_completion(&self, id: &QueryId) -> Result<QueryStatus, PromptdError> {
        self.wait_until(id, |s| s.completed).await
    }

    /// Signal shutdown, close the store, and wait for the worker to exit.
    pub async fn shutdown(&mut self) -> Vec<QueryId> {
        self.shutdown.cancel();
        let canceled = self.store.close();
        if let Some(worker) = self.worker.take() {
            let _ = tokio::time::timeout(WAIT_TIMEOUT, worker).await;
        }
        canceled
    }

    /// Whether the worker task has exited.
    pub fn worker_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
