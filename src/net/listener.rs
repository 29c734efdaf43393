//! TCP listener and admission-controlled accept loop.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections via semaphore, refusing instead of queueing
//! - Run admission (peer sanity, bans, rate window) before any byte is read
//! - Hand admitted sockets to connection workers

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::net::worker::ConnectionWorker;
use crate::observability::metrics;
use crate::server::context::{Admission, ServerContext};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),
    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(std::io::Error),
}

/// Result of one accept.
#[derive(Debug)]
pub enum Accepted {
    /// A slot was free; the permit must live as long as the connection.
    Admitted(TcpStream, SocketAddr, ConnectionPermit),
    /// Every slot was taken; the socket has already been dropped.
    Refused(SocketAddr),
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections are closed immediately.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to `address` with connection limits.
    pub async fn bind(address: &str, max_connections: usize) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        if addr.port() == 0 {
            return Err(ListenerError::Bind(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "port 0 is not a valid listening port",
            )));
        }

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, refusing it when no slot is free.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        match self.connection_limit.clone().try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(
                    peer_addr = %addr,
                    available_permits = self.connection_limit.available_permits(),
                    "Connection accepted"
                );
                Ok(Accepted::Admitted(stream, addr, ConnectionPermit { _permit: permit }))
            }
            Err(_) => {
                drop(stream);
                tracing::debug!(peer_addr = %addr, "Connection refused, at capacity");
                Ok(Accepted::Refused(addr))
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Control handle for a running accept loop.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn the accept loop on `listener`.
    pub fn spawn(listener: Listener, context: Arc<ServerContext>) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Shutdown::new();
        let task = tokio::spawn(accept_loop(
            listener,
            context,
            Arc::clone(&running),
            shutdown.subscribe(),
        ));

        Ok(Self {
            local_addr,
            running,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Stop accepting and wait for the loop to release the socket.
    pub async fn stop(self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.trigger();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Accept loop ended abnormally");
        }
    }
}

async fn accept_loop(
    listener: Listener,
    context: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut housekeeping = tokio::time::interval(context.config().admission.rolling_window());
    housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while running.load(Ordering::Acquire) {
        if !context.health().is_ready() || !context.health().is_healthy().await {
            let retry = Duration::from_secs(context.config().health.retry_interval_secs);
            tracing::warn!(retry_secs = retry.as_secs(), "Server not ready or unhealthy, pausing accepts");
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(retry) => continue,
            }
        }

        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            _ = housekeeping.tick() => {
                context.housekeep();
                continue;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(Accepted::Admitted(stream, addr, permit)) => {
                // Dual-stack sockets report IPv4 peers as ::ffff:a.b.c.d.
                let ip = addr.ip().to_canonical();
                match context.admit(ip) {
                    Admission::Admitted => {
                        metrics::record_accepted();
                        let handle = context.connections.register_inbound(ip, Some(permit));
                        metrics::set_active_connections(context.connections.inbound_len());
                        let worker = ConnectionWorker::new(Arc::clone(&context), handle, stream);
                        tokio::spawn(worker.run());
                    }
                    rejected => {
                        tracing::debug!(peer_addr = %addr, reason = rejected.as_str(), "Connection rejected");
                        metrics::record_rejected(rejected.as_str());
                    }
                }
            }
            Ok(Accepted::Refused(_)) => metrics::record_rejected("capacity"),
            Err(e) => {
                // Usually descriptor exhaustion; back off briefly.
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    running.store(false, Ordering::Release);
    tracing::info!(address = ?listener.local_addr().ok(), "Accept loop stopped");
}
