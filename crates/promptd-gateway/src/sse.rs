// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events progress stream for one query.
//!
//! SSE event format:
//! ```text
//! event: fragment
//! data: {"index": 0, "text": "The"}
//!
//! event: complete
//! data: {<query status>}
//!
//! event: error
//! data: {"error": "query not found: ..."}
//! ```
//!
//! The stream polls the facade, so a client that connects late still
//! receives every fragment from the start.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};

use promptd_core::QueryId;
use promptd_engine::IngestionFacade;

use crate::server::GatewayState;

struct PollState {
    facade: IngestionFacade,
    id: QueryId,
    interval: Duration,
    sent: usize,
    pending: VecDeque<Event>,
    finished: bool,
    first_poll: bool,
}

fn fragment_event(index: usize, text: &str) -> Event {
    let data = serde_json::json!({ "index": index, "text": text });
    Event::default().event("fragment").data(data.to_string())
}

fn error_event(message: &str) -> Event {
    let data = serde_json::json!({ "error": message });
    Event::default().event("error").data(data.to_string())
}

/// Stream of progress events for `id`, ending after `complete` or `error`.
pub fn progress_stream(
    facade: IngestionFacade,
    id: QueryId,
    interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let state = PollState {
        facade,
        id,
        interval,
        sent: 0,
        pending: VecDeque::new(),
        finished: false,
        first_poll: true,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            if !state.first_poll {
                tokio::time::sleep(state.interval).await;
            }
            state.first_poll = false;

            match state.facade.status(&state.id) {
                Ok(status) => {
                    for (index, text) in status.partial_responses.iter().enumerate().skip(state.sent) {
                        state.pending.push_back(fragment_event(index, text));
                    }
                    state.sent = status.partial_responses.len();

                    if status.completed {
                        let data = serde_json::to_string(&status)
                            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
                        state
                            .pending
                            .push_back(Event::default().event("complete").data(data));
                        state.finished = true;
                    }
                }
                Err(e) => {
                    state.pending.push_back(error_event(&e.to_string()));
                    state.finished = true;
                }
            }
        }
    })
}

/// GET /v1/queries/{id}/events
pub async fn query_events(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = progress_stream(state.facade, QueryId::from(id), state.sse_poll_interval);
    Sse::new(stream).keep_alive(KeepAlive::default())
}
