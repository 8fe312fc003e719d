//! Network runtime adapter.
//!
//! # Responsibilities
//! - Build the Tokio runtime the server runs on
//! - Bind the TCP listener to the configured host/port
//! - Serve the router until a shutdown signal arrives
//!
//! # Design Decisions
//! - The runtime's own request logging runs at [`RUNTIME_LOG_LEVEL`],
//!   independent of the console level the operator picked
//! - `serve` blocks the calling thread; bootstrap stays synchronous

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::http::WebSocketServer;
use crate::lifecycle::signals::shutdown_signal;

/// Verbosity of the network runtime's own logging.
pub const RUNTIME_LOG_LEVEL: Level = Level::DEBUG;

/// Log targets owned by the network runtime.
pub const RUNTIME_LOG_TARGETS: &[&str] = &["tower_http", "axum", "vtuber_server::net"];

/// Address the runtime binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTarget {
    pub host: String,
    pub port: u16,
}

impl From<&ServerConfig> for BindTarget {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Error type for server startup and serving.
#[derive(Debug, Error)]
pub enum ServerStartupError {
    #[error("failed to prepare server: {0}")]
    Construct(#[source] io::Error),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to bind {target}: {source}")]
    Bind {
        target: BindTarget,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Something that can run the server until the process is told to stop.
pub trait NetworkRuntime {
    /// Bind to `target` and serve `server`, blocking until shutdown.
    ///
    /// `on_listening` is called once with the bound address, before the
    /// first connection is accepted. It is never called if binding fails.
    fn serve(
        &mut self,
        server: WebSocketServer,
        target: &BindTarget,
        log_level: Level,
        on_listening: &mut dyn FnMut(SocketAddr),
    ) -> Result<(), ServerStartupError>;
}

/// Multi-threaded Tokio runtime serving the Axum router.
#[derive(Debug, Default)]
pub struct TokioRuntime;

impl NetworkRuntime for TokioRuntime {
    fn serve(
        &mut self,
        server: WebSocketServer,
        target: &BindTarget,
        log_level: Level,
        on_listening: &mut dyn FnMut(SocketAddr),
    ) -> Result<(), ServerStartupError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("vtuber-worker")
            .build()
            .map_err(ServerStartupError::Runtime)?;

        runtime.block_on(async move {
            let listener = TcpListener::bind((target.host.as_str(), target.port))
                .await
                .map_err(|source| ServerStartupError::Bind {
                    target: target.clone(),
                    source,
                })?;
            let addr = listener
                .local_addr()
                .map_err(|source| ServerStartupError::Bind {
                    target: target.clone(),
                    source,
                })?;
            on_listening(addr);

            let router = with_request_tracing(server.router(), log_level);
            serve_until(listener, router, shutdown_signal())
                .await
                .map_err(ServerStartupError::Serve)
        })
    }
}

/// Wrap the router with request tracing at `level`.
pub fn with_request_tracing(router: Router, level: Level) -> Router {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(level))
            .on_request(DefaultOnRequest::new().level(level))
            .on_response(DefaultOnResponse::new().level(level))
            .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
    )
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve_until<F>(listener: TcpListener, router: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(address = %addr, "Server stopped");
    Ok(())
}
