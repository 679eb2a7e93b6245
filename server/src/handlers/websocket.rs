//! WebSocket handler for list loading, fetching and live updates.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use datasource_engine::{DataSourcePayload, ListIndex};

use crate::repository::FetchResponse;
use crate::websocket::{ClientMessage, ServerMessage};
use crate::AppState;

use super::{handle_fetch, handle_initial};

/// Handle an established WebSocket connection.
///
/// Registers the connection, forwards queued messages to the socket from a
/// separate task, answers incoming messages, and unregisters on disconnect.
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = state.conn_manager.register(tx);

    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &state, &conn_id);
                state.conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    state.conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = state.conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message and return the reply for that connection.
pub fn process_message(text: &str, state: &AppState, conn_id: &str) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    let query = client_msg.initial_query();
    match client_msg {
        ClientMessage::Load {
            list_id,
            request_id,
            ..
        } => {
            let query = query.unwrap_or_default();
            match handle_initial(&state.repository, &list_id, &query) {
                Ok(payload) => {
                    if let Some((start, count)) = loaded_range(state, &payload) {
                        state
                            .conn_manager
                            .track_window(conn_id, &list_id, start, count);
                    }
                    ServerMessage::Loaded {
                        source_type: payload.source_type(),
                        payload,
                        request_id,
                    }
                }
                Err(e) => ServerMessage::error(e.to_string(), request_id),
            }
        }

        ClientMessage::Subscribe {
            list_id,
            request_id,
        } => match state.repository.summary(&list_id) {
            Ok(summary) => {
                state.conn_manager.subscribe(conn_id, &list_id);
                ServerMessage::Subscribed {
                    list_id,
                    list_version: summary.list_version,
                    request_id,
                }
            }
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },

        ClientMessage::Unsubscribe {
            list_id,
            request_id,
        } => {
            state.conn_manager.unsubscribe(conn_id, &list_id);
            ServerMessage::Unsubscribed {
                list_id,
                request_id,
            }
        }

        ClientMessage::Fetch {
            request,
            request_id,
        } => match handle_fetch(&state.repository, None, &request) {
            Ok(payload) => {
                if let Some((start, count)) = fetched_range(state, &payload) {
                    state
                        .conn_manager
                        .extend_window(conn_id, request.list_id(), start, count);
                }
                ServerMessage::FetchResponse {
                    source_type: payload.source_type(),
                    payload,
                    request_id,
                }
            }
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },

        ClientMessage::Ping => ServerMessage::Pong,
    }
}

/// Backing-list range an initial payload covers.
fn loaded_range(state: &AppState, payload: &DataSourcePayload) -> Option<(ListIndex, usize)> {
    match payload {
        DataSourcePayload::Index(p) => Some((p.start_index, p.items.len())),
        DataSourcePayload::Token(p) => state
            .repository
            .page_start(&p.list_id, &p.page_token)
            .ok()
            .map(|start| (start, p.items.len())),
    }
}

/// Backing-list range a fetch response covers.
fn fetched_range(state: &AppState, payload: &FetchResponse) -> Option<(ListIndex, usize)> {
    match payload {
        FetchResponse::Index(r) => Some((r.start_index, r.items.len())),
        FetchResponse::Token(r) => state
            .repository
            .page_start(&r.list_id, &r.page_token)
            .ok()
            .map(|start| (start, r.items.len())),
    }
}
