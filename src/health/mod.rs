//! Readiness and health gating.
//!
//! # Data Flow
//! ```text
//! ServerCore::initialize
//!     → HealthGate (initialized flag, tunnel requirement)
//!
//! Accept loop, every iteration:
//!     → is_ready   (initialized, tunnel connected when required)
//!     → is_healthy (probe.rs reachability, cached; tunnel alive when required)
//! ```
//!
//! # Design Decisions
//! - Probe results are cached so the accept loop never waits on the network
//!   more than once per cache period
//! - Readiness is cleared on shutdown

pub mod probe;
pub mod tunnel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use probe::Reachability;
pub use tunnel::{ProcessTunnel, Tunnel, TunnelError};

pub struct HealthGate {
    initialized: AtomicBool,
    tunnel_required: bool,
    tunnel: Option<Arc<dyn Tunnel>>,
    probe: Reachability,
    cache_ttl: Duration,
    last_probe: Mutex<Option<(Instant, bool)>>,
}

impl HealthGate {
    pub fn new(
        probe: Reachability,
        cache_ttl: Duration,
        tunnel_required: bool,
        tunnel: Option<Arc<dyn Tunnel>>,
    ) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            tunnel_required,
            tunnel,
            probe,
            cache_ttl,
            last_probe: Mutex::new(None),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_tunnel_required(&self) -> bool {
        self.tunnel_required
    }

    pub fn tunnel(&self) -> Option<&Arc<dyn Tunnel>> {
        self.tunnel.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        !self.tunnel_required || self.tunnel.as_ref().is_some_and(|t| t.is_ready())
    }

    pub async fn is_healthy(&self) -> bool {
        if self.tunnel_required && !self.tunnel.as_ref().is_some_and(|t| t.is_healthy()) {
            return false;
        }
        self.has_internet().await
    }

    /// Reachability result, reprobed once the cached value is older than the
    /// cache period.
    pub async fn has_internet(&self) -> bool {
        let now = Instant::now();
        let cached = *self.last_probe.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((at, online)) = cached {
            if now.duration_since(at) < self.cache_ttl {
                return online;
            }
        }

        let online = self.probe.check().await;
        if !online {
            tracing::warn!(targets = ?self.probe.targets(), "Reachability probe failed");
        }
        *self.last_probe.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), online));
        online
    }

    /// Stop the tunnel and clear readiness.
    pub fn shutdown(&self) {
        self.set_initialized(false);
        if let Some(tunnel) = &self.tunnel {
            tunnel.shutdown();
        }
    }
}
