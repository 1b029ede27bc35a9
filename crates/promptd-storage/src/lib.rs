// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite query event log for promptd.
//!
//! Records submission and completion events emitted by the engine. The log
//! is observational: nothing in the engine reads it back, and write failures
//! never change query state.

pub mod database;
pub mod events;
pub mod migrations;
pub mod recorder;

pub use database::Database;
pub use events::{EventCounts, EventLog, StoredEvent};
pub use recorder::run_event_recorder;
