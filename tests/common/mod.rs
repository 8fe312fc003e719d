//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;

use vtuber_server::lifecycle::BootstrapOptions;
use vtuber_server::net::{BindTarget, NetworkRuntime, ServerStartupError};
use vtuber_server::WebSocketServer;

/// Minimal valid configuration binding to 127.0.0.1:8000.
pub const VALID_CONFIG: &str = "\
system:
  conf_version: v1.1.1
  host: 127.0.0.1
  port: 8000
character:
  conf_name: shizuku
";

/// Log directory shared by every test in one binary.
///
/// The first logging init fixes the file for the whole process, so all
/// bootstraps point at the same place.
pub fn shared_log_dir() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| tempfile::tempdir().expect("log tempdir"))
        .path()
}

/// Fresh process root, optionally with a `conf.yaml`.
pub fn project_root(config: Option<&str>) -> TempDir {
    let root = tempfile::tempdir().expect("root tempdir");
    if let Some(config) = config {
        fs::write(root.path().join("conf.yaml"), config).expect("write conf.yaml");
    }
    root
}

/// Bootstrap options for `root`, logging into [`shared_log_dir`].
pub fn options_for(root: &Path) -> BootstrapOptions {
    let mut options = BootstrapOptions::new(root, LevelFilter::INFO);
    options.log_dir = shared_log_dir().to_path_buf();
    options
}

/// Everything the stub runtime was handed.
#[derive(Debug, Clone)]
pub struct ServeCall {
    pub target: BindTarget,
    pub log_level: Level,
    pub cache_dir: PathBuf,
}

/// What the stub runtime does once called.
#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    ReturnOk,
    FailBind,
    Panic,
}

/// Records serve calls instead of binding a socket.
#[derive(Clone)]
pub struct StubRuntime {
    pub calls: Arc<Mutex<Vec<ServeCall>>>,
    behavior: StubBehavior,
}

impl StubRuntime {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            behavior,
        }
    }

    pub fn calls(&self) -> Vec<ServeCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl NetworkRuntime for StubRuntime {
    fn serve(
        &mut self,
        server: WebSocketServer,
        target: &BindTarget,
        log_level: Level,
        on_listening: &mut dyn FnMut(SocketAddr),
    ) -> Result<(), ServerStartupError> {
        self.calls.lock().unwrap().push(ServeCall {
            target: target.clone(),
            log_level,
            cache_dir: server.cache_dir().to_path_buf(),
        });

        if let StubBehavior::FailBind = self.behavior {
            return Err(ServerStartupError::Bind {
                target: target.clone(),
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            });
        }

        on_listening(SocketAddr::from(([127, 0, 0, 1], target.port)));
        match self.behavior {
            StubBehavior::Panic => panic!("runtime exploded"),
            _ => Ok(()),
        }
    }
}

/// Cleanup action counting its invocations.
pub fn counting_cleanup() -> (
    Arc<AtomicUsize>,
    impl FnOnce() -> std::io::Result<()> + Send + 'static,
) {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    let action = move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };
    (counter, action)
}
