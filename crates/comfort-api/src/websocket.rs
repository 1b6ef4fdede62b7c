//! WebSocket handler for real-time updates

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    /// Clients that fall behind are told how many events they missed
    Lagged { missed: u64 },
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before greeting so no event slips between the two
    let mut event_rx = state.engine.subscribe();

    // Send connected message
    let Ok(connected_msg) = serde_json::to_string(&WsEvent::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    // Forward engine events to the client
    let send_task = tokio::spawn(async move {
        loop {
            // Engine events carry their own "type" tag
            let encoded = match event_rx.recv().await {
                Ok(event) => serde_json::to_string(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("WebSocket client lagged by {} events", missed);
                    serde_json::to_string(&WsEvent::Lagged { missed })
                }
                Err(RecvError::Closed) => break,
            };

            let json = match encoded {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Failed to encode WebSocket event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages are ignored; the socket is push-only
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Clean up
    send_task.abort();
}
