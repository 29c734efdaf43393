//! Tunnel collaborator.
//!
//! The server can sit behind an outbound tunnel process that publishes the
//! local port. The core only needs three answers from it: has it connected,
//! is it still alive, and shut it down.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

/// Line the tunnel process prints once a connection is registered.
const READY_MARKER: &str = "Registered tunnel connection";

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel name is empty")]
    EmptyName,
    #[error("tunnel executable {0} does not exist")]
    MissingExecutable(PathBuf),
    #[error("tunnel config {0} does not exist")]
    MissingConfig(PathBuf),
    #[error("failed to spawn tunnel: {0}")]
    Spawn(#[from] std::io::Error),
}

pub trait Tunnel: Send + Sync + 'static {
    /// The tunnel has registered at least one connection.
    fn is_ready(&self) -> bool;

    /// The tunnel is still running.
    fn is_healthy(&self) -> bool;

    /// Stop the tunnel. Idempotent.
    fn shutdown(&self);
}

/// Tunnel backed by a child process.
#[derive(Debug)]
pub struct ProcessTunnel {
    name: String,
    ready: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
}

impl ProcessTunnel {
    /// Spawn `<executable> tunnel --config <config_dir>/config.yml run <name>`.
    pub fn initialize(name: &str, executable: &Path, config_dir: &Path) -> Result<Self, TunnelError> {
        if name.trim().is_empty() {
            return Err(TunnelError::EmptyName);
        }
        if !executable.exists() {
            return Err(TunnelError::MissingExecutable(executable.to_path_buf()));
        }
        let config_file = config_dir.join("config.yml");
        if !config_file.exists() {
            return Err(TunnelError::MissingConfig(config_file));
        }

        let mut child = Command::new(executable)
            .arg("tunnel")
            .arg("--config")
            .arg(&config_file)
            .arg("run")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let ready = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        if let Some(stderr) = child.stderr.take() {
            let ready = Arc::clone(&ready);
            let tunnel = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(tunnel = %tunnel, "{line}");
                    if line.contains(READY_MARKER) && !ready.swap(true, Ordering::AcqRel) {
                        tracing::info!(tunnel = %tunnel, "Tunnel connection registered");
                    }
                }
            });
        }

        {
            let alive = Arc::clone(&alive);
            let ready = Arc::clone(&ready);
            let tunnel = name.to_string();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => {
                        tracing::error!(tunnel = %tunnel, status = ?status.ok(), "Tunnel process exited");
                    }
                    _ = stop_rx.changed() => {
                        if let Err(e) = child.kill().await {
                            tracing::warn!(tunnel = %tunnel, error = %e, "Failed to kill tunnel process");
                        }
                        tracing::info!(tunnel = %tunnel, "Tunnel stopped");
                    }
                }
                alive.store(false, Ordering::Release);
                ready.store(false, Ordering::Release);
            });
        }

        tracing::info!(tunnel = %name, executable = %executable.display(), "Tunnel process started");
        Ok(Self {
            name: name.to_string(),
            ready,
            alive,
            stop_tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Tunnel for ProcessTunnel {
    fn is_ready(&self) -> bool {
        self.alive.load(Ordering::Acquire) && self.ready.load(Ordering::Acquire)
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
    }
}
