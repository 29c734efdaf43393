//! Live connection records and the registry that owns them.
//!
//! # Responsibilities
//! - Generate unique connection and socket IDs for tracing and targeting
//! - Hold the authoritative set of live connections
//! - Coordinate forced disconnects with the owning worker
//!
//! # Design Decisions
//! - The registry owns every `Connection`; workers only hold a `Weak`
//! - The lock is held for structural changes only; stop signals go out after
//!   unlocking
//! - Synthetic connections have no socket and are only reachable by IP

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::http::request::RequestData;
use crate::http::response::ResponseData;
use crate::net::listener::ConnectionPermit;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle of an accepted socket, used to address server-originated sends and
/// forced disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SocketId(u64);

impl SocketId {
    pub fn next() -> Self {
        Self(SOCKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// One live connection, inbound or synthetic.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    socket: Option<SocketId>,
    ip: IpAddr,
    connected_at: Instant,
    running: AtomicBool,
    route: Mutex<Option<String>>,
    last_request: Mutex<Option<RequestData>>,
    stop_tx: watch::Sender<bool>,
    outbound: Option<mpsc::UnboundedSender<ResponseData>>,
    _permit: Option<ConnectionPermit>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// `None` for synthetic connections.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn is_inbound(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn route(&self) -> Option<String> {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<RequestData> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remember the most recent parsed request and its route.
    pub fn record_request(&self, request: &RequestData) {
        *self.route.lock().unwrap_or_else(PoisonError::into_inner) = Some(request.route.clone());
        *self.last_request.lock().unwrap_or_else(PoisonError::into_inner) = Some(request.clone());
    }

    /// Queue a server-originated response on the owning worker. Fails for
    /// synthetic connections and for workers that already exited.
    pub fn deliver(&self, response: ResponseData) -> bool {
        if !self.is_running() {
            return false;
        }
        match &self.outbound {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Flip the running flag and wake the worker.
    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.stop_tx.send(true);
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.as_u64(),
            socket: self.socket,
            ip: self.ip.to_string(),
            route: self.route(),
            running: self.is_running(),
            connected_secs: self.connected_at.elapsed().as_secs(),
        }
    }
}

/// Owned view of a connection for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: u64,
    pub socket: Option<SocketId>,
    pub ip: String,
    pub route: Option<String>,
    pub running: bool,
    pub connected_secs: u64,
}

/// What a worker needs to serve one inbound connection.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: ConnectionId,
    pub socket: SocketId,
    pub ip: IpAddr,
    pub connection: Weak<Connection>,
    pub stop: watch::Receiver<bool>,
    pub outbound: mpsc::UnboundedReceiver<ResponseData>,
}

/// Authoritative set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Connection>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an accepted socket and hand back what its worker needs.
    pub fn register_inbound(&self, ip: IpAddr, permit: Option<ConnectionPermit>) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let socket = SocketId::next();
        let connection = Arc::new(Connection {
            id: ConnectionId::new(),
            socket: Some(socket),
            ip,
            connected_at: Instant::now(),
            running: AtomicBool::new(true),
            route: Mutex::new(None),
            last_request: Mutex::new(None),
            stop_tx,
            outbound: Some(out_tx),
            _permit: permit,
        });

        let handle = WorkerHandle {
            id: connection.id,
            socket,
            ip,
            connection: Arc::downgrade(&connection),
            stop: stop_rx,
            outbound: out_rx,
        };
        self.lock().push(connection);

        tracing::trace!(connection_id = %handle.id, socket = %socket, ip = %ip, "Connection registered");
        handle
    }

    /// Register a socket-less connection for a server-originated send.
    pub fn register_synthetic(&self, ip: IpAddr) -> Arc<Connection> {
        let (stop_tx, _) = watch::channel(false);
        let connection = Arc::new(Connection {
            id: ConnectionId::new(),
            socket: None,
            ip,
            connected_at: Instant::now(),
            running: AtomicBool::new(true),
            route: Mutex::new(None),
            last_request: Mutex::new(None),
            stop_tx,
            outbound: None,
            _permit: None,
        });
        self.lock().push(Arc::clone(&connection));
        connection
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let entries: Vec<Arc<Connection>> = self.lock().clone();
        entries.iter().map(|c| c.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn inbound_len(&self) -> usize {
        self.lock().iter().filter(|c| c.is_inbound()).count()
    }

    pub fn find_socket(&self, socket: SocketId) -> Option<Arc<Connection>> {
        self.lock()
            .iter()
            .find(|c| c.socket == Some(socket))
            .cloned()
    }

    pub fn inbound_for_ip(&self, ip: IpAddr) -> Vec<Arc<Connection>> {
        self.lock()
            .iter()
            .filter(|c| c.is_inbound() && c.ip == ip)
            .cloned()
            .collect()
    }

    /// Force-disconnect the connection on `socket`. A miss is a no-op.
    pub fn disconnect_socket(&self, socket: SocketId) -> bool {
        let removed = self.remove_where(|c| c.socket == Some(socket));
        !removed.is_empty()
    }

    /// Force-disconnect every connection from `ip`, synthetic ones included.
    pub fn disconnect_ip(&self, ip: IpAddr) -> usize {
        self.remove_where(|c| c.ip == ip).len()
    }

    /// Natural completion. Converges with a forced disconnect that got there
    /// first.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        !self.remove_where(|c| c.id == id).is_empty()
    }

    /// Disconnect everything.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true).len()
    }

    fn remove_where<F>(&self, predicate: F) -> Vec<Arc<Connection>>
    where
        F: Fn(&Connection) -> bool,
    {
        let removed: Vec<Arc<Connection>> = {
            let mut entries = self.lock();
            let (removed, kept): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|c| predicate(c.as_ref()));
            *entries = kept;
            removed
        };
        for connection in &removed {
            connection.stop();
            tracing::trace!(connection_id = %connection.id, ip = %connection.ip, "Connection removed");
        }
        removed
    }
}
