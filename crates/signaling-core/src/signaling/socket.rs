//! WebSocket transport for the signaling channel

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, warn};

use super::SignalingChannel;
use crate::api::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let channel = state.signaling.clone();
    ws.on_upgrade(move |socket| serve_connection(socket, channel))
}

/// Pump one socket until either side closes
pub async fn serve_connection(socket: WebSocket, channel: Arc<SignalingChannel>) {
    let (connection_id, mut outbound) = channel.connect();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => channel.handle_frame(connection_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame on connection {}", connection_id);
            }
            // Ping/pong handled by axum
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ Socket error on connection {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Detaching drops the last sender, so the writer drains what is queued and closes
    channel.disconnect(connection_id).await;
    if let Err(e) = writer.await {
        warn!("⚠️ Writer for connection {} failed: {}", connection_id, e);
    }
}
