//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use http_warden::http::StatusPage;
use http_warden::{RequestHandler, ServerConfig, ServerCore};

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Loopback config with no reachability targets and no connection spacing.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.name = "warden-test".into();
    config.server.ip = "127.0.0.1".into();
    config.server.port = u32::from(free_port());
    config.health.reachability_targets.clear();
    config.admission.min_spacing_ms = 0;
    config.limits.idle_timeout_secs = 2;
    config
}

pub async fn start_server(config: ServerConfig) -> Arc<ServerCore> {
    start_with_handler(config, Arc::new(StatusPage::new("warden-test"))).await
}

pub async fn start_with_handler(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> Arc<ServerCore> {
    let core = Arc::new(ServerCore::initialize(config, handler, None).unwrap());
    assert!(core.start_listener().await.unwrap());
    core
}

pub async fn addr(core: &ServerCore) -> SocketAddr {
    core.local_addr().await.expect("listener running")
}

/// Read until EOF. A reset counts as EOF; whatever arrived before it is kept.
pub async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        Ok(Err(e)) => panic!("read failed: {e}"),
        Err(_) => panic!("server did not close the connection"),
    }
    buf
}

/// Send raw bytes on a fresh connection and collect everything until close.
pub async fn raw_request(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The server may already have closed on us; that is part of what is tested.
    let _ = stream.write_all(request).await;
    read_all(&mut stream).await
}

pub fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
