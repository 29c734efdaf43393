//! Server lifecycle: initialize, gate on readiness, run the listener, shut
//! down.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{validate_config, ServerConfig, ValidationError};
use crate::health::{HealthGate, Reachability, Tunnel};
use crate::http::handler::RequestHandler;
use crate::net::listener::{Listener, ListenerError, ListenerHandle};
use crate::server::context::ServerContext;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),
    #[error("a tunnel is required but none was provided")]
    TunnelMissing,
    #[error("server is not ready")]
    NotReady,
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Owns the server context and the listener slot.
pub struct ServerCore {
    context: Arc<ServerContext>,
    listener: Mutex<Option<ListenerHandle>>,
    shut_down: AtomicBool,
}

impl ServerCore {
    /// Validate `config`, seed the filter lists and mark the server
    /// initialized. A required tunnel must be supplied here.
    pub fn initialize(
        config: ServerConfig,
        handler: Arc<dyn RequestHandler>,
        tunnel: Option<Arc<dyn Tunnel>>,
    ) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ServerError::Config)?;
        if config.tunnel.required && tunnel.is_none() {
            return Err(ServerError::TunnelMissing);
        }

        let health = HealthGate::new(
            Reachability::from_config(&config.health),
            Duration::from_secs(config.health.cache_secs),
            config.tunnel.required,
            tunnel,
        );

        tracing::info!(
            name = %config.server.name,
            root = %config.server.root.display(),
            domains = ?config.server.domains,
            address = %config.bind_address(),
            tunnel_required = config.tunnel.required,
            "Server initialized"
        );

        let context = Arc::new(ServerContext::new(config, handler, health));
        context.health().set_initialized(true);

        Ok(Self {
            context,
            listener: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Bind and start the accept loop. `Ok(false)` when one is already
    /// running.
    pub async fn start_listener(&self) -> Result<bool, ServerError> {
        if !self.is_ready() {
            return Err(ServerError::NotReady);
        }

        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(ListenerHandle::is_running) {
            tracing::debug!("Listener already running");
            return Ok(false);
        }
        if let Some(stale) = slot.take() {
            stale.stop().await;
        }

        let config = self.context.config();
        let listener = Listener::bind(&config.bind_address(), config.listener.max_connections).await?;
        let handle = ListenerHandle::spawn(listener, Arc::clone(&self.context))?;
        tracing::info!(address = %handle.local_addr(), name = %config.server.name, "Accepting connections");
        *slot = Some(handle);
        Ok(true)
    }

    /// Stop accepting and force-disconnect every connection. Idempotent.
    pub async fn stop_listener(&self) {
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        let dropped = self.context.connections.clear();
        if dropped > 0 {
            tracing::info!(dropped_connections = dropped, "Listener stopped");
        }
    }

    pub async fn is_listener_running(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(ListenerHandle::is_running)
    }

    /// Address the running listener is bound to.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(ListenerHandle::local_addr)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.health().is_initialized()
    }

    pub fn is_ready(&self) -> bool {
        self.context.health().is_ready()
    }

    pub fn is_tunnel_required(&self) -> bool {
        self.context.health().is_tunnel_required()
    }

    pub async fn is_healthy(&self) -> bool {
        self.context.health().is_healthy().await
    }

    pub async fn has_internet(&self) -> bool {
        self.context.health().has_internet().await
    }

    pub fn name(&self) -> String {
        self.context.config().server.name.clone()
    }

    pub fn root(&self) -> std::path::PathBuf {
        self.context.config().server.root.clone()
    }

    pub fn domains(&self) -> Vec<String> {
        self.context.config().server.domains.clone()
    }

    pub fn ip(&self) -> String {
        self.context.config().server.ip.clone()
    }

    pub fn port(&self) -> u32 {
        self.context.config().server.port
    }

    /// Whether `path` is inside the configured root.
    pub fn is_under_root(&self, path: &Path) -> bool {
        path.starts_with(&self.context.config().server.root)
    }

    /// Stop the listener, drop every connection, stop the tunnel and clear
    /// readiness. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(name = %self.name(), "Server shutting down");
        self.stop_listener().await;
        self.context.clear_all_users();
        self.context.health().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::StatusPage;

    fn config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.ip = "127.0.0.1".into();
        config.health.reachability_targets.clear();
        config
    }

    fn handler() -> Arc<dyn RequestHandler> {
        Arc::new(StatusPage::new("test"))
    }

    #[test]
    fn invalid_config_rejected() {
        let mut bad = config();
        bad.server.port = 0;
        bad.server.name.clear();
        match ServerCore::initialize(bad, handler(), None) {
            Err(ServerError::Config(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn required_tunnel_must_be_supplied() {
        let mut cfg = config();
        cfg.tunnel.required = true;
        cfg.tunnel.name = "t".into();
        cfg.tunnel.executable = "/bin/true".into();
        cfg.tunnel.config_dir = "/tmp".into();
        assert!(matches!(
            ServerCore::initialize(cfg, handler(), None),
            Err(ServerError::TunnelMissing)
        ));
    }

    #[tokio::test]
    async fn shutdown_resets_readiness_and_is_idempotent() {
        let core = ServerCore::initialize(config(), handler(), None).unwrap();
        assert!(core.is_initialized());
        assert!(core.is_ready());
        assert!(!core.is_tunnel_required());
        assert!(core.is_healthy().await);

        core.shutdown().await;
        assert!(!core.is_ready());
        core.shutdown().await;
        assert!(matches!(core.start_listener().await, Err(ServerError::NotReady)));
    }

    #[test]
    fn getters_reflect_config() {
        let core = ServerCore::initialize(config(), handler(), None).unwrap();
        assert_eq!(core.name(), "http-warden");
        assert_eq!(core.ip(), "127.0.0.1");
        assert_eq!(core.port(), 8080);
        assert!(core.domains().is_empty());
        assert!(core.is_under_root(&core.root().join("index.html")));
    }
}
