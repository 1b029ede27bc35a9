// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for promptd.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level promptd configuration.
///
/// All sections are optional and default to values suitable for a local
/// Ollama instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptdConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Query event log settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Display name used in logs and the health endpoint.
    #[serde(default = "default_daemon_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds to wait for the in-flight query to stop during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: default_daemon_name(),
            log_level: default_log_level(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_daemon_name() -> String {
    "promptd".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/v1/*` and `/ws`. `None` leaves the API open.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// How often SSE progress streams poll query status, in milliseconds.
    #[serde(default = "default_sse_poll_interval_ms")]
    pub sse_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            sse_poll_interval_ms: default_sse_poll_interval_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_sse_poll_interval_ms() -> u64 {
    250
}

/// Generation backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier passed on every generation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Longest the backend may stay silent between reads before a generation
    /// fails, in seconds. A stream that keeps producing output is never cut off.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP errors before the stream starts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    1
}

/// Query event log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Record submission/completion events to SQLite.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file. When unset, one file per day under `db/`.
    #[serde(default)]
    pub database_path: Option<String>,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            wal_mode: true,
        }
    }
}

impl StorageConfig {
    /// The configured database path, or today's `db/database_MM_DD_YYYY.db`.
    pub fn resolved_database_path(&self) -> String {
        self.database_path.clone().unwrap_or_else(|| {
            let today = chrono::Local::now().format("%m_%d_%Y");
            format!("db/database_{today}.db")
        })
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}
