use crate::realtime::hub::CLIENT_BUFFER;
use crate::startup::AppState;
use axum::{
    extract::{
        Extension, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Upgrade endpoint for the live poll update stream. Clients receive every
/// poll event as a JSON text frame; no client->server application messages
/// are defined.
pub async fn polls_ws(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_BUFFER);
    let connection_id = app_state.hub.register(tx).await;
    debug!(connection_id, "websocket client connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if ws_sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // The hub dropped our sender (eviction or shutdown).
                    None => break,
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    // The read loop exists only to detect disconnect.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    app_state.hub.unregister(connection_id).await;
    debug!(connection_id, "websocket client disconnected");
}
