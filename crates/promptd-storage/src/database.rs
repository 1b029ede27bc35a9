// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup and migrations.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use promptd_core::PromptdError;
use tracing::{debug, info};

use crate::migrations;

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> PromptdError {
    PromptdError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// Parent directories are created, PRAGMAs applied, and pending
    /// migrations run before the handle is returned.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, PromptdError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PromptdError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| PromptdError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.initialize(wal_mode).await?;

        info!(path = %path.display(), wal_mode, "query event database opened");
        Ok(db)
    }

    /// A private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, PromptdError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| PromptdError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), PromptdError> {
        let pragmas = if wal_mode {
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;"
        } else {
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;"
        };

        let migrated = self
            .conn
            .call(move |conn| -> Result<Result<(), String>, rusqlite::Error> {
                conn.execute_batch(pragmas)?;
                Ok(migrations::run_migrations(conn).map_err(|e| e.to_string()))
            })
            .await
            .map_err(map_tr_err)?;

        migrated.map_err(|message| PromptdError::Storage {
            source: format!("migration failed: {message}").into(),
        })?;

        debug!("database migrations applied");
        Ok(())
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Names of user tables, for diagnostics.
    pub async fn table_names(&self) -> Result<Vec<String>, PromptdError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(map_tr_err)
    }
}
