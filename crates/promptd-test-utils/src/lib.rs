// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for promptd integration tests.
//!
//! Provides a mock backend and a harness for fast, deterministic tests
//! without a model server.
//!
//! # Components
//!
//! - [`MockBackend`] - Scripted fragment streams, injected failures, gated delivery
//! - [`TestHarness`] - Store, worker, and facade wired to a `MockBackend`

pub mod harness;
pub mod mock_backend;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_backend::{MockBackend, ScriptStep, completed_script, failing_script};
