//! `/ws`: snapshot on connect, then every notification in publish order.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use relay_core::{Notification, Snapshot};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

use crate::server::AppState;

/// First frame on every connection.
#[derive(Debug, Serialize)]
pub struct InitFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

impl<'a> InitFrame<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            kind: "init",
            snapshot,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (snapshot, mut rx) = match state.broker.subscribe().await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, "observer rejected: broker unavailable");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let metrics = state.metrics.clone();
    metrics.gauge_add("ws.connections", &[], 1);
    info!(
        events = snapshot.messages.len(),
        sessions = snapshot.sessions.len(),
        pending = snapshot.pending_permissions.len(),
        "observer connected"
    );

    let init = match serde_json::to_string(&InitFrame::new(&snapshot)) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode snapshot");
            metrics.gauge_add("ws.connections", &[], -1);
            return;
        }
    };

    if ws_tx.send(Message::Text(init.into())).await.is_ok() {
        let mut ping = tokio::time::interval(state.config.ws_ping_interval.max(Duration::from_millis(1)));
        let _ = ping.tick().await;
        let shutdown = state.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                note = rx.recv() => match note {
                    Ok(note) => {
                        if send_notification(&mut ws_tx, &note).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer lagging, notifications dropped");
                        metrics.counter_inc("ws.lagged", &[], skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    trace!("sent ping");
                }
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Observers only listen; anything they send is ignored.
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    metrics.gauge_add("ws.connections", &[], -1);
    debug!("observer disconnected");
}

async fn send_notification<S>(ws_tx: &mut S, note: &Notification) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(note) {
        Ok(text) => text,
        Err(e) => {
            // Skip the frame, keep the connection.
            warn!(error = %e, kind = note.event_type(), "failed to encode notification");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_frame_shape() {
        let snapshot = Snapshot {
            messages: Vec::new(),
            sessions: Vec::new(),
            pending_permissions: vec![3, 7],
        };
        let v = serde_json::to_value(InitFrame::new(&snapshot)).unwrap();
        assert_eq!(v["type"], "init");
        assert_eq!(v["pendingPermissions"], serde_json::json!([3, 7]));
        assert!(v["messages"].as_array().unwrap().is_empty());
        assert!(v["sessions"].is_array());
    }
}
