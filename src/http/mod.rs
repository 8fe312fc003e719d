//! HTTP and WebSocket surface of the server instance.
//!
//! # Data Flow
//! ```text
//! TCP connection (bound by net::runtime)
//!     → server.rs (Axum router: /client-ws, /health, static mounts)
//!     → websocket.rs (upgrade, client registry, frame intake)
//!     → message protocol layer (external)
//! ```

pub mod server;
pub mod websocket;

pub use server::{AppState, WebSocketServer, DEFAULT_CACHE_DIR};
pub use websocket::{ClientInfo, ClientRegistry};
