//! Networking subsystem.
//!
//! # Data Flow
//! ```text
//! ValidatedConfig.system.{host, port}
//!     → runtime.rs (BindTarget, Tokio runtime, TcpListener)
//!     → axum::serve with graceful shutdown
//!     → http::WebSocketServer router
//! ```

pub mod runtime;

pub use runtime::{BindTarget, NetworkRuntime, ServerStartupError, TokioRuntime, RUNTIME_LOG_LEVEL};
