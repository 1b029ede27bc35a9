// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task that persists engine lifecycle events.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use promptd_core::QueryEvent;

use crate::events::EventLog;

/// Drain `rx` into `log` until the channel closes or `shutdown` fires.
///
/// Events already queued when shutdown fires are still written. A failed
/// insert is logged and skipped. Returns the number of events written.
pub async fn run_event_recorder(
    log: EventLog,
    mut rx: mpsc::UnboundedReceiver<QueryEvent>,
    shutdown: CancellationToken,
) -> usize {
    let mut written = 0;

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = shutdown.cancelled() => break,
        };
        let Some(event) = event else {
            break;
        };
        written += persist(&log, &event).await;
    }

    while let Ok(event) = rx.try_recv() {
        written += persist(&log, &event).await;
    }

    debug!(written, "event recorder stopped");
    written
}

async fn persist(log: &EventLog, event: &QueryEvent) -> usize {
    match log.record(event).await {
        Ok(_) => 1,
        Err(e) => {
            warn!(
                query_id = %event.query_id(),
                kind = event.kind(),
                error = %e,
                "failed to record query event"
            );
            0
        }
    }
}
