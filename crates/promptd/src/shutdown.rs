// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal handling and worker draining.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C is handled");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Wait up to `grace` for the worker to finish its current query.
///
/// If the grace period runs out, `interrupt` is cancelled so the worker stops
/// consuming the backend stream, and the worker is awaited once more.
pub async fn drain_worker(worker: JoinHandle<()>, interrupt: CancellationToken, grace: Duration) {
    let mut worker = worker;
    match tokio::time::timeout(grace, &mut worker).await {
        Ok(result) => {
            if let Err(e) = result {
                warn!(error = %e, "query worker task failed");
            }
            info!("query worker drained");
        }
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "query worker still running after grace period, interrupting"
            );
            interrupt.cancel();
            if let Err(e) = worker.await {
                warn!(error = %e, "query worker task failed");
            }
        }
    }
}
