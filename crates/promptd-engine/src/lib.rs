// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query orchestration for promptd.
//!
//! Callers submit prompts through the [`IngestionFacade`] and get an id back
//! immediately. A single [`Worker`] drains the shared [`QueryStore`] in FIFO
//! order, streaming fragments from a
//! [`GenerationBackend`](promptd_core::GenerationBackend) into the query's
//! partial responses, which callers poll with `status` while generation is
//! still in progress.

pub mod facade;
pub mod query;
pub mod store;
pub mod worker;

pub use facade::IngestionFacade;
pub use query::QueryStatus;
pub use store::{Completion, DequeuedQuery, QueryStore, StoreStats};
pub use worker::Worker;
