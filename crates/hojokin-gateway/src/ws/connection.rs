use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use hojokin_core::config::{HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES, OUTBOUND_QUEUE_CAPACITY};
use hojokin_core::types::ConnId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::{handshake, message, send};

/// Who an authenticated connection belongs to.
pub struct Session {
    pub user_id: String,
    pub is_admin: bool,
}

/// WS connection states: linear progression, no backwards transitions.
pub enum ConnState {
    AwaitingConnect,
    Authenticated(Session),
    Closing,
}

/// Axum handler: upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_PAYLOAD_BYTES)
        .on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection event loop: lives for the entire WS session.
///
/// Responses are written straight to the socket; hub events (edits, locks,
/// notifications, ticks) arrive through the bounded outbound channel.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnId::new();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);

    let nonce = handshake::make_nonce();
    if send::text(&mut tx, handshake::challenge_event(&nonce)).await.is_err() {
        return;
    }
    let mut conn_state = ConnState::AwaitingConnect;

    // handshake must complete within 10s
    let deadline =
        tokio::time::Instant::now() + std::time::Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let handshake_timer = tokio::time::sleep_until(deadline);
    tokio::pin!(handshake_timer);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, size = text.len(), "payload too large");
                            break;
                        }
                        conn_state = message::handle(
                            &conn_id, text.as_str(), conn_state, &mut tx, &out_tx, &state,
                        ).await;
                        if matches!(conn_state, ConnState::Closing) { break; }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }

            Some(frame) = out_rx.recv() => {
                if send::text(&mut tx, frame).await.is_err() {
                    break;
                }
            }

            _ = &mut handshake_timer, if matches!(conn_state, ConnState::AwaitingConnect) => {
                warn!(conn_id = %conn_id, "handshake timeout");
                break;
            }
        }
    }

    if matches!(conn_state, ConnState::Authenticated(_)) {
        state.hub.unregister(&conn_id).await;
    }
    info!(conn_id = %conn_id, "WS connection closed");
}
