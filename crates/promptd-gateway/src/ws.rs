// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket session for submitting and polling queries.
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "submit", "message": "Why is the sky blue?", "context": [1, 2]}
//! {"type": "status", "query_id": "..."}
//! {"type": "cancel", "query_id": "..."}
//! ```
//!
//! Server -> Client: the same JSON bodies the REST routes return, or
//! `{"error": "..."}`.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;

use promptd_core::{ContinuationContext, QueryId};
use promptd_engine::IngestionFacade;

use crate::handlers::{self, CancelResponse, SubmitRequest};
use crate::server::GatewayState;

/// WebSocket message from client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsRequest {
    Submit {
        message: String,
        #[serde(default)]
        context: Option<ContinuationContext>,
    },
    Status {
        query_id: QueryId,
    },
    Cancel {
        query_id: QueryId,
    },
}

fn error_value(message: impl std::fmt::Display) -> Value {
    serde_json::json!({ "error": message.to_string() })
}

fn to_value<T: serde::Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or_else(|e| error_value(e))
}

/// Answer one client message.
fn handle_message(facade: &IngestionFacade, text: &str) -> Value {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("invalid WebSocket message: {e}");
            return error_value(format!("invalid message: {e}"));
        }
    };

    match request {
        WsRequest::Submit { message, context } => {
            match handlers::submit(facade, SubmitRequest { message, context }) {
                Ok(ack) => to_value(&ack),
                Err(err) => to_value(&err),
            }
        }
        WsRequest::Status { query_id } => match facade.status(&query_id) {
            Ok(status) => to_value(&status),
            Err(e) => error_value(e),
        },
        WsRequest::Cancel { query_id } => {
            let canceled = facade.cancel(&query_id);
            to_value(&CancelResponse { query_id, canceled })
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state.facade))
}

/// Serve one connection: each text frame gets exactly one reply.
async fn handle_socket(mut socket: WebSocket, facade: IngestionFacade) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let reply = handle_message(&facade, text.as_str());
                if socket
                    .send(Message::Text(reply.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping (handled by tungstenite layer)
        }
    }
    tracing::debug!("websocket session closed");
}
