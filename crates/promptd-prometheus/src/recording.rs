// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so calls are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all promptd metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "promptd_queries_submitted_total",
        "Total queries accepted by the ingestion facade"
    );
    describe_counter!(
        "promptd_queries_completed_total",
        "Total queries that reached a terminal state, by outcome"
    );
    describe_counter!(
        "promptd_fragments_total",
        "Total non-empty fragments appended to partial responses"
    );
    describe_gauge!("promptd_queue_depth", "Queries waiting for the worker");
    describe_histogram!(
        "promptd_generation_seconds",
        "Wall time from dequeue to completion in seconds"
    );
}

/// How a query left the engine, used as the `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Canceled,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Canceled => "canceled",
            Outcome::Failed => "failed",
        }
    }
}

/// Record an accepted submission.
pub fn record_submitted() {
    metrics::counter!("promptd_queries_submitted_total").increment(1);
}

/// Record a query reaching a terminal state.
pub fn record_completed(outcome: Outcome) {
    metrics::counter!("promptd_queries_completed_total", "outcome" => outcome.as_str())
        .increment(1);
}

/// Record one appended fragment.
pub fn record_fragment() {
    metrics::counter!("promptd_fragments_total").increment(1);
}

/// Set the number of queued queries.
pub fn set_queue_depth(depth: f64) {
    metrics::gauge!("promptd_queue_depth").set(depth);
}

/// Record how long the worker spent on one query.
pub fn record_generation(seconds: f64) {
    metrics::histogram!("promptd_generation_seconds").record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::Completed.as_str(), "completed");
        assert_eq!(Outcome::Canceled.as_str(), "canceled");
        assert_eq!(Outcome::Failed.as_str(), "failed");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        register_metrics();
        record_submitted();
        record_completed(Outcome::Failed);
        record_fragment();
        set_queue_depth(3.0);
        record_generation(0.25);
    }
}
