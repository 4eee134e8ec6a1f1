//! Websocket push channel.
//!
//! Each socket is registered under a client id for as long as it is open.
//! Outgoing messages go through an unbounded channel, so a broadcast never
//! waits on a slow socket.

use super::{AppState, types::WsQuery};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use dmx_core::{Connection, DmxError};
use tokio::sync::mpsc;

/// The sending half of one registered socket. The token tells apart
/// successive sockets of the same client id.
#[derive(Debug, Clone)]
pub struct WsConnection {
    tx: mpsc::UnboundedSender<String>,
    token: u64,
}

impl WsConnection {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<String>, token: u64) -> Self {
        Self { tx, token }
    }

    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Connection for WsConnection {
    fn send(&self, message: &str) -> Result<(), DmxError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| DmxError::InvalidState("websocket is closed".to_string()))
    }
}

/// `GET /websocket`: upgrade and register the connection.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.next_client_id());
    ws.on_upgrade(move |socket| serve_socket(socket, state, client_id))
}

async fn serve_socket(mut socket: WebSocket, state: AppState, client_id: String) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let token = state.next_token();
    state.connections.register(client_id.clone(), WsConnection::new(tx, token));
    tracing::info!(%client_id, "websocket opened");

    // Incoming messages are ignored; the socket is push-only.
    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if socket.send(Message::Text(message.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    release(&state, &client_id, token);
    tracing::info!(%client_id, "websocket closed");
}

/// Drop the registration of a closed socket, unless a newer socket of the
/// same client has taken its place.
fn release(state: &AppState, client_id: &str, token: u64) -> bool {
    state
        .connections
        .unregister_if(client_id, |current| current.token() == token)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_core::{CoreService, StorageBackend};

    #[test]
    fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = WsConnection::new(tx, 1);
        connection.send("first").expect("open");
        drop(rx);
        assert!(connection.send("second").is_err());
    }

    #[test]
    fn closing_old_socket_keeps_reconnected_client() {
        let state = AppState::new(CoreService::new(StorageBackend::default()).expect("core"));
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old = state.next_token();
        let new = state.next_token();
        state.connections.register("tab", WsConnection::new(old_tx, old));
        state.connections.register("tab", WsConnection::new(new_tx, new));

        assert!(!release(&state, "tab", old));
        assert_eq!(state.connections.broadcast("update"), 1);
        assert_eq!(new_rx.try_recv().expect("delivered"), "update");

        assert!(release(&state, "tab", new));
        assert!(state.connections.is_empty());
    }
}
