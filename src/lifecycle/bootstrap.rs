//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging before anything else can fail
//! - Arm the cache cleanup before any resource needing it exists
//! - Load and validate configuration
//! - Construct the server instance and hand it to the network runtime
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing is retried
//! - One error boundary: every failure, panics included, becomes a
//!   [`BootstrapError`] that is logged once with its full cause chain
//! - Cleanup is a scoped guard, so it runs on every exit path of `run`

use std::any::Any;
use std::error::Error as _;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Once};

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::config::{load_and_validate, ConfigError, DEFAULT_CONFIG_PATH};
use crate::http::{WebSocketServer, DEFAULT_CACHE_DIR};
use crate::lifecycle::cleanup::{CleanupAction, CleanupGuard};
use crate::lifecycle::state::{Lifecycle, LifecycleState};
use crate::net::{BindTarget, NetworkRuntime, ServerStartupError, RUNTIME_LOG_LEVEL};
use crate::observability::logging::{init_logging, LogSettings, LoggingInitError, DEFAULT_LOG_DIR};

/// Clean shutdown.
pub const EXIT_OK: u8 = 0;
/// The server could not be constructed, bound or served.
pub const EXIT_STARTUP: u8 = 1;
/// Configuration missing, malformed or invalid.
pub const EXIT_CONFIG: u8 = 2;
/// Log sinks could not be installed.
pub const EXIT_LOGGING: u8 = 3;
/// Anything unexpected (panics).
pub const EXIT_UNHANDLED: u8 = 70;

/// Fatal bootstrap failure.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    LoggingInit(#[from] LoggingInitError),

    #[error(transparent)]
    ServerStartup(#[from] ServerStartupError),

    #[error("unhandled fault during bootstrap: {0}")]
    Unhandled(String),
}

impl BootstrapError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Config(_) => EXIT_CONFIG,
            BootstrapError::LoggingInit(_) => EXIT_LOGGING,
            BootstrapError::ServerStartup(_) => EXIT_STARTUP,
            BootstrapError::Unhandled(_) => EXIT_UNHANDLED,
        }
    }

    /// Lifecycle state this failure leads to.
    pub fn fatal_state(&self) -> LifecycleState {
        match self {
            BootstrapError::Config(_) => LifecycleState::FatalConfigError,
            _ => LifecycleState::FatalStartupError,
        }
    }
}

/// Paths and levels for one bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Process root; the other paths default to locations below it.
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub console_level: LevelFilter,
    pub log_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl BootstrapOptions {
    pub fn new(root: impl Into<PathBuf>, console_level: LevelFilter) -> Self {
        let root = root.into();
        Self {
            config_path: root.join(DEFAULT_CONFIG_PATH),
            log_dir: root.join(DEFAULT_LOG_DIR),
            cache_dir: root.join(DEFAULT_CACHE_DIR),
            console_level,
            root,
        }
    }
}

/// What happened during [`Bootstrapper::run`].
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub exit_code: u8,
    pub history: Vec<LifecycleState>,
}

impl BootstrapReport {
    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_OK
    }

    /// Whether the process passed through `state`.
    pub fn reached(&self, state: LifecycleState) -> bool {
        self.history.contains(&state)
    }
}

/// Drives the startup sequence.
pub struct Bootstrapper<R> {
    options: BootstrapOptions,
    runtime: R,
    cleanup: Option<CleanupAction>,
}

impl<R: NetworkRuntime> Bootstrapper<R> {
    pub fn new(options: BootstrapOptions, runtime: R) -> Self {
        Self {
            options,
            runtime,
            cleanup: None,
        }
    }

    /// Replace the exit-time action. Defaults to clearing the server cache.
    pub fn with_cleanup<F>(mut self, action: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        self.cleanup = Some(Box::new(action));
        self
    }

    /// Run the whole sequence. Returns once the runtime has shut down or
    /// startup has failed; the cleanup action has run by then.
    pub fn run(self) -> BootstrapReport {
        let Self {
            options,
            mut runtime,
            cleanup,
        } = self;
        let mut lifecycle = Lifecycle::new();

        let settings = LogSettings {
            console_level: options.console_level,
            log_dir: options.log_dir.clone(),
        };
        let sinks = match init_logging(&settings) {
            Ok(sinks) => sinks,
            Err(e) => {
                // No sink is up; stderr is all there is.
                let err = BootstrapError::from(e);
                eprintln!("fatal: {}", error_chain(&err));
                lifecycle.advance(LifecycleState::FatalStartupError);
                lifecycle.advance(LifecycleState::Exited);
                return BootstrapReport {
                    exit_code: err.exit_code(),
                    history: lifecycle.into_history(),
                };
            }
        };
        lifecycle.advance(LifecycleState::LoggingReady);
        install_panic_hook();

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = %sinks.log_file().display(),
            console_level = %options.console_level,
            "Open-LLM-VTuber server starting"
        );

        let action: CleanupAction = match cleanup {
            Some(action) => action,
            None => {
                let cache_dir = options.cache_dir.clone();
                Box::new(move || WebSocketServer::clean_cache(&cache_dir))
            }
        };
        let mut guard = CleanupGuard::arm("cache", action);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            start(&options, &mut runtime, &mut lifecycle)
        }))
        .unwrap_or_else(|payload| Err(BootstrapError::Unhandled(panic_message(payload.as_ref()))));

        let exit_code = match &outcome {
            Ok(()) => EXIT_OK,
            Err(e) => {
                report_failure(e);
                lifecycle.advance(e.fatal_state());
                e.exit_code()
            }
        };

        lifecycle.advance(LifecycleState::Terminating);
        if guard.run() {
            lifecycle.advance(LifecycleState::CacheCleared);
        }
        lifecycle.advance(LifecycleState::Exited);
        tracing::info!(exit_code, "Shutdown complete");

        BootstrapReport {
            exit_code,
            history: lifecycle.into_history(),
        }
    }
}

fn start<R: NetworkRuntime>(
    options: &BootstrapOptions,
    runtime: &mut R,
    lifecycle: &mut Lifecycle,
) -> Result<(), BootstrapError> {
    let config = Arc::new(load_and_validate(&options.config_path)?);
    lifecycle.advance(LifecycleState::ConfigValidated);

    let target = BindTarget::from(&config.system);
    tracing::info!(
        path = %options.config_path.display(),
        bind = %target,
        conf_version = ?config.system.conf_version,
        sections = config.sections.len(),
        "Configuration loaded"
    );

    let server = WebSocketServer::new(config, &options.root, &options.cache_dir)
        .map_err(ServerStartupError::Construct)?;
    lifecycle.advance(LifecycleState::ServerConstructed);

    let mut on_listening = |addr: SocketAddr| {
        tracing::info!(address = %addr, "Accepting connections");
        lifecycle.advance(LifecycleState::Running);
    };
    runtime.serve(server, &target, RUNTIME_LOG_LEVEL, &mut on_listening)?;
    Ok(())
}

fn report_failure(err: &BootstrapError) {
    if let BootstrapError::Config(ConfigError::Validation { path, errors }) = err {
        for violation in errors {
            tracing::error!(
                field = %violation.field,
                reason = violation.reason.code(),
                detail = %violation,
                "Configuration violation"
            );
        }
        tracing::error!(
            path = %path.display(),
            violations = errors.len(),
            "Configuration invalid, refusing to start"
        );
        return;
    }

    tracing::error!(
        error = %error_chain(err),
        exit_code = err.exit_code(),
        "Startup failed"
    );
}

/// `err` followed by each of its causes.
fn error_chain(err: &BootstrapError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // Transparent variants repeat their inner message.
        if !message.ends_with(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Route panic reports into the log sinks.
fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        panic::set_hook(Box::new(|info| {
            tracing::error!(panic = %info, "Unhandled panic");
        }));
    });
}
