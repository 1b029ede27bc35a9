// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation backend for deterministic testing.
//!
//! `MockBackend` implements `GenerationBackend` with pre-scripted fragment
//! sequences, enabling fast tests without a running model server.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{Mutex, Semaphore};

use promptd_core::{
    AdapterType, ContinuationContext, Fragment, FragmentStream, GenerationBackend,
    GenerationRequest, HealthStatus, PluginAdapter, PromptdError,
};

/// Context returned by the default script.
pub const DEFAULT_CONTEXT: [i64; 3] = [1, 2, 3];

/// One item a scripted stream yields.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Fragment(Fragment),
    /// Yield a backend error, ending the stream abnormally.
    Fail(String),
}

/// Text fragments followed by a final empty fragment carrying `context`.
pub fn completed_script(texts: &[&str], context: Option<ContinuationContext>) -> Vec<ScriptStep> {
    let mut steps: Vec<ScriptStep> = texts
        .iter()
        .map(|t| ScriptStep::Fragment(Fragment::text(*t)))
        .collect();
    steps.push(ScriptStep::Fragment(Fragment::last("", context)));
    steps
}

/// Text fragments followed by a backend error.
pub fn failing_script(texts: &[&str], error: &str) -> Vec<ScriptStep> {
    let mut steps: Vec<ScriptStep> = texts
        .iter()
        .map(|t| ScriptStep::Fragment(Fragment::text(*t)))
        .collect();
    steps.push(ScriptStep::Fail(error.to_string()));
    steps
}

/// Increments a counter when the stream that owns it is dropped.
struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct StreamState {
    steps: VecDeque<ScriptStep>,
    gate: Option<Arc<Semaphore>>,
    _guard: DropGuard,
}

/// A mock backend that replays scripted fragment streams.
///
/// Scripts are popped from a FIFO queue, one per `generate` call. When the
/// queue is empty a default two-fragment completion is produced. A gated
/// backend yields each step only after [`release`](Self::release) grants a
/// permit, which lets tests interleave cancellation with delivery.
pub struct MockBackend {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    start_failures: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    gate: Option<Arc<Semaphore>>,
    streams_dropped: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            start_failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: None,
            streams_dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock backend pre-loaded with the given scripts.
    pub fn with_scripts(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from(scripts)),
            ..Self::new()
        }
    }

    /// Hold every step until a permit is released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Allow `steps` more steps through the gate. No-op when not gated.
    pub fn release(&self, steps: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(steps);
        }
    }

    pub async fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().await.push_back(steps);
    }

    /// Make the next `generate` call fail before any stream is returned.
    pub async fn fail_next_start(&self, message: &str) {
        self.start_failures
            .lock()
            .await
            .push_back(message.to_string());
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of returned streams that have been dropped.
    pub fn streams_dropped(&self) -> usize {
        self.streams_dropped.load(Ordering::SeqCst)
    }

    async fn next_script(&self) -> Vec<ScriptStep> {
        self.scripts.lock().await.pop_front().unwrap_or_else(|| {
            completed_script(
                &["mock", " response"],
                Some(ContinuationContext::new(DEFAULT_CONTEXT.to_vec())),
            )
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptdError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptdError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, PromptdError> {
        self.requests.lock().await.push(request);

        if let Some(message) = self.start_failures.lock().await.pop_front() {
            return Err(PromptdError::backend(message));
        }

        let state = StreamState {
            steps: VecDeque::from(self.next_script().await),
            gate: self.gate.clone(),
            _guard: DropGuard(self.streams_dropped.clone()),
        };

        let stream = stream::unfold(state, |mut state| async move {
            if let Some(gate) = &state.gate {
                // A closed semaphore ends the stream.
                gate.acquire().await.ok()?.forget();
            }
            let step = state.steps.pop_front()?;
            let item = match step {
                ScriptStep::Fragment(fragment) => Ok(fragment),
                ScriptStep::Fail(message) => Err(PromptdError::backend(message)),
            };
            Some((item, state))
        });

        Ok(Box::pin(stream))
    }
}
