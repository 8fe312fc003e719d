//! Open-LLM-VTuber server bootstrap.
//!
//! Loads `conf.yaml`, validates it, builds the WebSocket server and runs it
//! until the process is told to stop, clearing the transient cache on the
//! way out.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ServerConfig, ValidatedConfig};
pub use http::WebSocketServer;
pub use lifecycle::{BootstrapOptions, Bootstrapper};
