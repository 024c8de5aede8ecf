//! Notifier event stream over WebSocket. A subscriber that falls behind the
//! broadcast channel's capacity is dropped with a `lagged` signal rather than
//! held open; it is expected to reconcile via `?since=<seq>` on reconnect, or
//! by polling REST directly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    pub since: Option<u64>,
}

pub async fn stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.since.unwrap_or(0)))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, since: u64) {
    for event in state.notifier.backfill_since(since) {
        let Ok(body) = serde_json::to_string(&event) else { continue };
        if socket.send(Message::Text(body.into())).await.is_err() {
            return;
        }
    }

    let mut rx = state.notifier.subscribe();
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(event) => {
                        let Ok(body) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(body.into())).await.is_err() {
                            return;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notifier subscriber lagged, disconnecting");
                        let _ = socket
                            .send(Message::Text(
                                serde_json::json!({ "event": "lagged", "skipped": skipped }).to_string().into(),
                            ))
                            .await;
                        return;
                    },
                    Err(RecvError::Closed) => return,
                }
            },
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {},
                }
            },
        }
    }
}
