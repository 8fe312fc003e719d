//! WebSocket client endpoint.
//!
//! # Responsibilities
//! - Complete the upgrade handshake on `/client-ws`
//! - Track connected clients for the lifetime of their socket
//! - Hand frames to the message protocol layer (not part of this crate;
//!   frames are counted and logged)
//!
//! # Design Decisions
//! - One registry entry per socket, keyed by a fresh UUID
//! - The entry is removed on every exit path of the socket loop
//! - Ping/pong is answered by axum

use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use uuid::Uuid;

use crate::http::server::AppState;

/// Bookkeeping for one connected client.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub connected_at: SystemTime,
    pub frames_received: u64,
}

/// Concurrent registry of connected clients.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<DashMap<Uuid, ClientInfo>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its id.
    pub fn register(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.insert(
            id,
            ClientInfo {
                connected_at: SystemTime::now(),
                frames_received: 0,
            },
        );
        id
    }

    /// Count a frame received from `id`.
    pub fn record_frame(&self, id: &Uuid) {
        if let Some(mut info) = self.inner.get_mut(id) {
            info.frames_received += 1;
        }
    }

    /// Remove a client, returning its final bookkeeping.
    pub fn unregister(&self, id: &Uuid) -> Option<ClientInfo> {
        self.inner.remove(id).map(|(_, info)| info)
    }

    pub fn get(&self, id: &Uuid) -> Option<ClientInfo> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.clients))
}

async fn handle_socket(mut socket: WebSocket, clients: ClientRegistry) {
    let id = clients.register();
    tracing::info!(client_id = %id, connected = clients.len(), "Client connected");

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => {
                clients.record_frame(&id);
                tracing::debug!(client_id = %id, bytes = text.len(), "Text frame received");
            }
            Ok(Message::Binary(data)) => {
                clients.record_frame(&id);
                tracing::debug!(client_id = %id, bytes = data.len(), "Binary frame received");
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(client_id = %id, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    let frames = clients.unregister(&id).map_or(0, |info| info.frames_received);
    tracing::info!(client_id = %id, frames, connected = clients.len(), "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lifecycle() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());

        let a = registry.register();
        let b = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.record_frame(&a);
        registry.record_frame(&a);
        assert_eq!(registry.get(&a).unwrap().frames_received, 2);
        assert_eq!(registry.get(&b).unwrap().frames_received, 0);

        let info = registry.unregister(&a).unwrap();
        assert_eq!(info.frames_received, 2);
        assert!(registry.unregister(&a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ClientRegistry::new();
        let clone = registry.clone();
        let id = clone.register();
        assert!(registry.get(&id).is_some());
    }
}
