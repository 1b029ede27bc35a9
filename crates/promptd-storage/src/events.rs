// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The query event log: one row per submission and per completion.

use async_trait::async_trait;
use rusqlite::params;
use serde::Serialize;

use promptd_core::{AdapterType, HealthStatus, PluginAdapter, PromptdError, QueryEvent};

use crate::database::{Database, map_tr_err};

/// A stored event row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub query_id: String,
    pub kind: String,
    pub prompt_chars: Option<i64>,
    pub fragments: Option<i64>,
    pub canceled: bool,
    pub error: Option<String>,
    pub created_at: String,
}

/// Aggregate counts across the whole log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub submitted: i64,
    pub completed: i64,
    pub canceled: i64,
    pub failed: i64,
}

/// Append-only log of query lifecycle events.
#[derive(Clone)]
pub struct EventLog {
    db: Database,
}

impl EventLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Append one event. Returns the row id.
    pub async fn record(&self, event: &QueryEvent) -> Result<i64, PromptdError> {
        let kind = event.kind();
        let query_id = event.query_id().to_string();
        let (prompt_chars, fragments, canceled, error, at) = match event {
            QueryEvent::Submitted {
                prompt_chars, at, ..
            } => (Some(*prompt_chars as i64), None, false, None, at.clone()),
            QueryEvent::Completed {
                fragments,
                canceled,
                error,
                at,
                ..
            } => (
                None,
                Some(*fragments as i64),
                *canceled,
                error.clone(),
                at.clone(),
            ),
        };

        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO query_events
                        (query_id, kind, prompt_chars, fragments, canceled, error, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![query_id, kind, prompt_chars, fragments, canceled, error, at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Every event recorded for one query, oldest first.
    pub async fn events_for(&self, query_id: &str) -> Result<Vec<StoredEvent>, PromptdError> {
        let query_id = query_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, query_id, kind, prompt_chars, fragments, canceled, error, created_at
                     FROM query_events
                     WHERE query_id = ?1
                     ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![query_id], |row| {
                        Ok(StoredEvent {
                            id: row.get(0)?,
                            query_id: row.get(1)?,
                            kind: row.get(2)?,
                            prompt_chars: row.get(3)?,
                            fragments: row.get(4)?,
                            canceled: row.get(5)?,
                            error: row.get(6)?,
                            created_at: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Submission and outcome totals.
    ///
    /// A completion with an error counts as failed; otherwise a canceled
    /// flag counts as canceled.
    pub async fn counts(&self) -> Result<EventCounts, PromptdError> {
        self.db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT
                        COALESCE(SUM(kind = 'submitted'), 0),
                        COALESCE(SUM(kind = 'completed' AND error IS NULL AND canceled = 0), 0),
                        COALESCE(SUM(kind = 'completed' AND error IS NULL AND canceled = 1), 0),
                        COALESCE(SUM(kind = 'completed' AND error IS NOT NULL), 0)
                     FROM query_events",
                    [],
                    |row| {
                        Ok(EventCounts {
                            submitted: row.get(0)?,
                            completed: row.get(1)?,
                            canceled: row.get(2)?,
                            failed: row.get(3)?,
                        })
                    },
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for EventLog {
    fn name(&self) -> &str {
        "sqlite-event-log"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptdError> {
        let probe = self
            .db
            .connection()
            .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await;
        Ok(match probe {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), PromptdError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use promptd_core::QueryId;

    use super::*;

    async fn test_log() -> EventLog {
        EventLog::new(Database::open_in_memory().await.unwrap())
    }

    fn submitted(id: &str) -> QueryEvent {
        QueryEvent::Submitted {
            query_id: QueryId::from(id),
            prompt_chars: 20,
            at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    fn completed(id: &str, canceled: bool, error: Option<&str>) -> QueryEvent {
        QueryEvent::Completed {
            query_id: QueryId::from(id),
            fragments: 3,
            canceled,
            error: error.map(str::to_string),
            at: "2026-01-01T00:00:01+00:00".into(),
        }
    }

    #[tokio::test]
    async fn record_and_read_back() {
        let log = test_log().await;
        log.record(&submitted("q1")).await.unwrap();
        log.record(&completed("q1", false, None)).await.unwrap();
        log.record(&submitted("q2")).await.unwrap();

        let events = log.events_for("q1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "submitted");
        assert_eq!(events[0].prompt_chars, Some(20));
        assert_eq!(events[0].fragments, None);
        assert_eq!(events[1].kind, "completed");
        assert_eq!(events[1].fragments, Some(3));
        assert!(!events[1].canceled);
    }

    #[tokio::test]
    async fn events_for_unknown_query_is_empty() {
        let log = test_log().await;
        assert!(log.events_for("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counts_classify_outcomes() {
        let log = test_log().await;
        assert_eq!(log.counts().await.unwrap(), EventCounts::default());

        for id in ["a", "b", "c", "d"] {
            log.record(&submitted(id)).await.unwrap();
        }
        log.record(&completed("a", false, None)).await.unwrap();
        log.record(&completed("b", true, None)).await.unwrap();
        log.record(&completed("c", false, Some("backend down"))).await.unwrap();

        let counts = log.counts().await.unwrap();
        assert_eq!(
            counts,
            EventCounts {
                submitted: 4,
                completed: 1,
                canceled: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let log = test_log().await;
        assert_eq!(log.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(log.adapter_type(), AdapterType::Storage);
    }
}
