// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single consumer that drives queued queries through the backend.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use promptd_core::{FragmentStream, GenerationBackend, GenerationRequest, QueryId};

use crate::store::{Completion, DequeuedQuery, QueryStore};

const STREAM_ENDED_EARLY: &str = "backend stream ended without a final fragment";
const INTERRUPTED_BY_SHUTDOWN: &str = "generation interrupted by shutdown";

/// Processes one query at a time, in submission order.
///
/// Exactly one worker runs per store; it is the only writer of a query's
/// partial responses, continuation context, and `Running`/`Completed` state.
pub struct Worker {
    store: Arc<QueryStore>,
    backend: Arc<dyn GenerationBackend>,
    model: String,
    shutdown: CancellationToken,
}

/// Result of consuming a backend stream.
enum StreamEnd {
    Done(Completion),
    Canceled,
    Failed(String),
}

impl Worker {
    pub fn new(
        store: Arc<QueryStore>,
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            backend,
            model: model.into(),
            shutdown,
        }
    }

    /// Run the worker loop on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Take queries off the store until it is closed or shutdown is signaled.
    pub async fn run(self) {
        info!(
            model = %self.model,
            backend = self.backend.name(),
            "query worker started"
        );

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = self.store.dequeue() => job,
            };
            let Some(job) = job else {
                break;
            };
            self.process(job).await;
        }

        info!("query worker stopped");
    }

    async fn process(&self, job: DequeuedQuery) {
        let id = job.id;
        let started = Instant::now();

        if job.cancel_requested {
            debug!(query_id = %id, "query canceled before start, skipping generation");
            self.finish(&id, Completion::default(), started);
            return;
        }

        debug!(query_id = %id, model = %self.model, "query running");

        let request = GenerationRequest {
            model: self.model.clone(),
            prompt: job.prompt,
            context: job.resume_from,
        };

        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(INTERRUPTED_BY_SHUTDOWN.to_string()),
            opened = self.backend.generate(request) => opened.map_err(|e| e.to_string()),
        };

        let end = match opened {
            Ok(stream) => self.consume(&id, stream).await,
            Err(message) => StreamEnd::Failed(message),
        };

        let completion = match end {
            StreamEnd::Done(completion) => completion,
            StreamEnd::Canceled => {
                debug!(query_id = %id, "generation stopped on cancel request");
                Completion::default()
            }
            StreamEnd::Failed(message) => {
                warn!(query_id = %id, error = %message, "generation failed, keeping partial output");
                Completion::failed(message)
            }
        };
        self.finish(&id, completion, started);
    }

    /// Append fragments until the stream finishes, fails, or is canceled.
    ///
    /// Returning drops `stream`, which aborts the backend request.
    async fn consume(&self, id: &QueryId, mut stream: FragmentStream) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return StreamEnd::Failed(INTERRUPTED_BY_SHUTDOWN.to_string());
                }
                next = stream.next() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return StreamEnd::Failed(e.to_string()),
                None => return StreamEnd::Failed(STREAM_ENDED_EARLY.to_string()),
            };

            let cancel_requested = if fragment.text.is_empty() {
                self.store.is_cancel_requested(id)
            } else {
                self.store.append_fragment(id, fragment.text)
            };

            if fragment.done {
                return StreamEnd::Done(Completion::success(fragment.context));
            }
            if cancel_requested {
                return StreamEnd::Canceled;
            }
        }
    }

    fn finish(&self, id: &QueryId, completion: Completion, started: Instant) {
        let elapsed = started.elapsed();
        #[cfg(feature = "prometheus")]
        promptd_prometheus::record_generation(elapsed.as_secs_f64());

        match self.store.complete(id, completion) {
            Some(status) => info!(
                query_id = %id,
                fragments = status.partial_responses.len(),
                canceled = status.canceled_requested,
                failed = status.error.is_some(),
                elapsed_ms = elapsed.as_millis() as u64,
                "query completed"
            ),
            None => warn!(query_id = %id, "query was no longer running at completion"),
        }
    }
}
