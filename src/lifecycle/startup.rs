//! Startup orchestration.
//!
//! # Order
//! ```text
//! config → logging → metrics → reachability → tunnel (when required)
//!     → ServerCore::initialize → wait for readiness → listener
//!     → admin API → config watcher → wait for signal → shutdown
//! ```
//!
//! Any failure before the listener starts is fatal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::admin;
use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError, ServerConfig};
use crate::health::{ProcessTunnel, Reachability, Tunnel, TunnelError};
use crate::http::handler::{RequestHandler, StatusPage};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::server::{ServerCore, ServerError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no outbound connectivity, refusing to start")]
    Offline,
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("interrupted before the server became ready")]
    Interrupted,
}

/// Run the server until a termination signal arrives.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?config_path, "http-warden starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    if !Reachability::from_config(&config.health).check().await {
        return Err(StartupError::Offline);
    }

    let tunnel: Option<Arc<dyn Tunnel>> = if config.tunnel.required {
        let tunnel: Arc<dyn Tunnel> = Arc::new(ProcessTunnel::initialize(
            &config.tunnel.name,
            &config.tunnel.executable,
            &config.tunnel.config_dir,
        )?);
        Some(tunnel)
    } else {
        None
    };

    let handler: Arc<dyn RequestHandler> = Arc::new(StatusPage::new(config.server.name.clone()));
    let core = Arc::new(ServerCore::initialize(config.clone(), handler, tunnel)?);

    if !wait_until_ready(&core).await {
        core.shutdown().await;
        return Err(StartupError::Interrupted);
    }
    if let Err(e) = core.start_listener().await {
        core.shutdown().await;
        return Err(e.into());
    }

    let shutdown = Shutdown::new();

    if config.admin.enabled {
        let admin_core = Arc::clone(&core);
        let admin_shutdown = shutdown.subscribe();
        let address = config.admin.bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(&address, admin_core, admin_shutdown).await {
                tracing::error!(address = %address, error = %e, "Admin API failed");
            }
        });
    }

    // The watcher must stay alive for as long as reloads are wanted.
    let _watcher = config_path.as_deref().and_then(|path| {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        let context = Arc::clone(core.context());
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    update = updates.recv() => match update {
                        Some(config) => context.apply_config(config),
                        None => break,
                    },
                }
            }
        });
        match watcher.run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload unavailable");
                None
            }
        }
    });

    signals::wait_for_signal().await;

    shutdown.trigger();
    core.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Poll readiness once a second, as a required tunnel can take a while to
/// register. Returns false when interrupted.
async fn wait_until_ready(core: &ServerCore) -> bool {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let signal = signals::wait_for_signal();
    tokio::pin!(signal);

    loop {
        if core.is_ready() {
            return true;
        }
        tokio::select! {
            _ = &mut signal => return false,
            _ = ticker.tick() => {}
        }
        if !core.is_ready() {
            tracing::info!("Waiting for the tunnel to finish connecting...");
        }
    }
}
