// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `promptd serve` implementation.
//!
//! Builds the single [`QueryStore`], wires the backend, worker, storage,
//! metrics, and gateway around it, and runs until a shutdown signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use promptd_config::PromptdConfig;
use promptd_core::{GenerationBackend, HealthStatus, PluginAdapter, PromptdError};
use promptd_engine::{IngestionFacade, QueryStore, Worker};
use promptd_gateway::{AuthConfig, Gateway, GatewayState, HealthState, MetricsRender, ServerConfig};
use promptd_ollama::OllamaBackend;

use crate::shutdown;

/// Run the daemon until SIGINT/SIGTERM.
pub async fn run_serve(config: PromptdConfig) -> Result<(), PromptdError> {
    init_tracing(&config.daemon.log_level);
    info!(name = %config.daemon.name, "starting promptd");

    let metrics_render = init_metrics(&config)?;

    // Lifecycle events go to storage when enabled; otherwise the store has no channel.
    let recorder_shutdown = CancellationToken::new();
    let (store, recorder) = init_store(&config, recorder_shutdown.clone()).await?;

    let backend = Arc::new(OllamaBackend::new(&config.backend)?);
    match backend.health_check().await {
        Ok(HealthStatus::Healthy) => info!(model = %config.backend.model, "backend ready"),
        Ok(HealthStatus::Degraded(detail)) | Ok(HealthStatus::Unhealthy(detail)) => {
            warn!(detail = %detail, "backend not ready, queries will fail until it is reachable");
        }
        Err(e) => warn!(error = %e, "backend health check failed"),
    }

    let worker_interrupt = CancellationToken::new();
    let worker = Worker::new(
        store.clone(),
        backend.clone() as Arc<dyn GenerationBackend>,
        config.backend.model.clone(),
        worker_interrupt.clone(),
    )
    .spawn();

    let shutdown_token = shutdown::install_signal_handler();

    let gateway = Gateway::new(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
        },
        GatewayState {
            facade: IngestionFacade::new(store.clone()),
            auth: AuthConfig {
                bearer_token: config.server.bearer_token.clone(),
            },
            health: HealthState {
                start_time: Instant::now(),
                name: config.daemon.name.clone(),
                backend: Some(backend.clone() as Arc<dyn GenerationBackend>),
                prometheus_render: metrics_render,
            },
            sse_poll_interval: Duration::from_millis(config.server.sse_poll_interval_ms),
        },
    );

    let gateway_result = gateway.run(shutdown_token.clone()).await;
    if gateway_result.is_err() {
        // Bind failures return before any signal; stop everything else too.
        shutdown_token.cancel();
    }

    let canceled = store.close();
    if !canceled.is_empty() {
        info!(count = canceled.len(), "canceled queued queries at shutdown");
    }
    shutdown::drain_worker(
        worker,
        worker_interrupt,
        Duration::from_secs(config.daemon.shutdown_grace_secs),
    )
    .await;

    recorder_shutdown.cancel();
    if let Some(recorder) = recorder {
        match recorder.await {
            Ok(written) => info!(written, "event recorder stopped"),
            Err(e) => warn!(error = %e, "event recorder task failed"),
        }
    }

    let stats = store.stats();
    info!(
        completed = stats.completed,
        canceled = stats.canceled,
        total = stats.total,
        "promptd stopped"
    );
    gateway_result
}

#[cfg(feature = "prometheus")]
fn init_metrics(config: &PromptdConfig) -> Result<Option<MetricsRender>, PromptdError> {
    if !config.metrics.enabled {
        return Ok(None);
    }
    let adapter = Arc::new(promptd_prometheus::PrometheusAdapter::new()?);
    let render: MetricsRender = Arc::new(move || adapter.render());
    Ok(Some(render))
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(config: &PromptdConfig) -> Result<Option<MetricsRender>, PromptdError> {
    if config.metrics.enabled {
        warn!("metrics enabled in config but promptd was built without the prometheus feature");
    }
    Ok(None)
}

type RecorderHandle = tokio::task::JoinHandle<usize>;

#[cfg(feature = "sqlite")]
async fn init_store(
    config: &PromptdConfig,
    recorder_shutdown: CancellationToken,
) -> Result<(Arc<QueryStore>, Option<RecorderHandle>), PromptdError> {
    use promptd_storage::{Database, EventLog, run_event_recorder};

    if !config.storage.enabled {
        return Ok((Arc::new(QueryStore::new()), None));
    }

    let path = config.storage.resolved_database_path();
    let db = Database::open(&path, config.storage.wal_mode).await?;
    info!(path = %path, "event storage opened");

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let recorder = tokio::spawn(run_event_recorder(EventLog::new(db), rx, recorder_shutdown));
    Ok((Arc::new(QueryStore::with_events(tx)), Some(recorder)))
}

#[cfg(not(feature = "sqlite"))]
async fn init_store(
    config: &PromptdConfig,
    _recorder_shutdown: CancellationToken,
) -> Result<(Arc<QueryStore>, Option<RecorderHandle>), PromptdError> {
    if config.storage.enabled {
        warn!("storage enabled in config but promptd was built without the sqlite feature");
    }
    Ok((Arc::new(QueryStore::new()), None))
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("promptd={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
