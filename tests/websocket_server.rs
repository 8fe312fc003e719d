//! Server behavior over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use vtuber_server::config::{load_and_validate, ValidatedConfig};
use vtuber_server::net::runtime::{serve_until, with_request_tracing};
use vtuber_server::WebSocketServer;

mod common;
use common::{project_root, VALID_CONFIG};

struct RunningServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
    _root: tempfile::TempDir,
}

impl RunningServer {
    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stops")
            .unwrap()
            .unwrap();
    }
}

async fn start_server() -> RunningServer {
    let root = project_root(Some(VALID_CONFIG));
    let config: Arc<ValidatedConfig> =
        Arc::new(load_and_validate(&root.path().join("conf.yaml")).unwrap());
    let server =
        WebSocketServer::new(config, root.path(), &root.path().join("cache")).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = with_request_tracing(server.router(), tracing::Level::DEBUG);

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve_until(listener, router, async move {
        let _ = rx.await;
    }));

    RunningServer {
        addr,
        shutdown: Some(tx),
        handle,
        _root: root,
    }
}

/// Plain HTTP/1.1 GET returning the response body.
async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {response}");
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default()
}

async fn connected_clients(addr: SocketAddr) -> u64 {
    let body = http_get(addr, "/health").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    json["connected_clients"].as_u64().unwrap()
}

async fn wait_for_clients(addr: SocketAddr, expected: u64) {
    for _ in 0..50 {
        if connected_clients(addr).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connected_clients never reached {expected}");
}

#[tokio::test]
async fn test_health_reports_version() {
    let server = start_server().await;

    let body = http_get(server.addr, "/health").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["conf_version"], "v1.1.1");
    assert_eq!(json["connected_clients"], 0);

    server.stop().await;
}

#[tokio::test]
async fn test_client_is_tracked_while_connected() {
    let server = start_server().await;

    let url = format!("ws://{}/client-ws", server.addr);
    let (mut ws, _) = connect_async(url).await.unwrap();
    ws.send(Message::text(r#"{"type":"fetch-configs"}"#))
        .await
        .unwrap();
    wait_for_clients(server.addr, 1).await;

    ws.close(None).await.unwrap();
    while ws.next().await.is_some() {}
    wait_for_clients(server.addr, 0).await;

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_signal_stops_server() {
    let server = start_server().await;
    let addr = server.addr;
    server.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
}
