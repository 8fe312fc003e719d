//! Server instance setup.
//!
//! # Responsibilities
//! - Own the validated configuration, client registry and cache directory
//! - Create the Axum Router (WebSocket endpoint, health, static mounts)
//! - Clear the transient cache on shutdown

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::config::ValidatedConfig;
use crate::http::websocket::{ws_handler, ClientRegistry};

/// Cache directory, relative to the process root.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Static mounts served when their directory exists under the root.
const STATIC_MOUNTS: &[(&str, &str)] = &[
    ("/live2d-models", "live2d-models"),
    ("/bg", "backgrounds"),
    ("/avatars", "avatars"),
];

const FRONTEND_DIR: &str = "frontend";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ValidatedConfig>,
    pub clients: ClientRegistry,
}

/// The long-lived server object.
pub struct WebSocketServer {
    state: AppState,
    root: PathBuf,
    cache_dir: PathBuf,
}

impl WebSocketServer {
    /// Create the server, making sure the cache directory exists.
    pub fn new(config: Arc<ValidatedConfig>, root: &Path, cache_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(cache_dir)?;

        tracing::debug!(
            root = %root.display(),
            cache_dir = %cache_dir.display(),
            "Server instance created"
        );

        Ok(Self {
            state: AppState {
                config,
                clients: ClientRegistry::new(),
            },
            root: root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.state.config
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.state.clients
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/client-ws", get(ws_handler))
            .route("/health", get(health))
            .nest_service("/cache", ServeDir::new(&self.cache_dir));

        for (path, dir) in STATIC_MOUNTS {
            let dir = self.root.join(dir);
            if dir.is_dir() {
                tracing::debug!(mount = *path, dir = %dir.display(), "Static mount");
                router = router.nest_service(path, ServeDir::new(dir));
            }
        }

        let frontend = self.root.join(FRONTEND_DIR);
        if frontend.is_dir() {
            router = router.fallback_service(
                ServeDir::new(frontend).append_index_html_on_directories(true),
            );
        }

        router.with_state(self.state.clone())
    }

    /// Empty the cache directory, keeping the directory itself.
    ///
    /// Does not touch any server instance, so it can run after the server
    /// has been dropped.
    pub fn clean_cache(cache_dir: &Path) -> io::Result<()> {
        if !cache_dir.exists() {
            return Ok(());
        }

        let mut removed = 0usize;
        for entry in fs::read_dir(cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }

        tracing::info!(cache_dir = %cache_dir.display(), removed, "Cache cleared");
        Ok(())
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub conf_version: Option<String>,
    pub connected_clients: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        conf_version: state.config.system.conf_version.clone(),
        connected_clients: state.clients.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, ValidatedConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn test_config() -> Arc<ValidatedConfig> {
        Arc::new(ValidatedConfig {
            system: ServerConfig {
                host: "127.0.0.1".into(),
                port: 12393,
                conf_version: Some("v1.1.1".into()),
                config_alts_dir: "characters".into(),
                tool_prompts: BTreeMap::new(),
            },
            sections: BTreeMap::new(),
        })
    }

    #[test]
    fn test_new_creates_cache_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let server = WebSocketServer::new(test_config(), root.path(), &cache).unwrap();
        assert!(cache.is_dir());
        assert_eq!(server.cache_dir(), cache.as_path());
        assert_eq!(server.config().system.port, 12393);
    }

    #[test]
    fn test_clean_cache_keeps_directory() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        fs::create_dir_all(cache.join("nested")).unwrap();
        fs::write(cache.join("a.wav"), b"RIFF").unwrap();
        fs::write(cache.join("nested/b.wav"), b"RIFF").unwrap();

        WebSocketServer::clean_cache(&cache).unwrap();

        assert!(cache.is_dir());
        assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_cache_missing_dir_is_ok() {
        let root = tempfile::tempdir().unwrap();
        WebSocketServer::clean_cache(&root.path().join("absent")).unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let root = tempfile::tempdir().unwrap();
        let server =
            WebSocketServer::new(test_config(), root.path(), &root.path().join("cache")).unwrap();
        server.clients().register();

        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["conf_version"], "v1.1.1");
        assert_eq!(json["connected_clients"], 1);
    }

    #[tokio::test]
    async fn test_cache_is_served() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let server = WebSocketServer::new(test_config(), root.path(), &cache).unwrap();
        fs::write(cache.join("clip.txt"), "hello").unwrap();

        let response = server
            .router()
            .oneshot(Request::get("/cache/clip.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_frontend_fallback() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("frontend")).unwrap();
        fs::write(root.path().join("frontend/index.html"), "<html></html>").unwrap();
        let server =
            WebSocketServer::new(test_config(), root.path(), &root.path().join("cache")).unwrap();

        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
