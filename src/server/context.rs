//! Process-scoped state shared by the listener, workers and admin API.
//!
//! # Responsibilities
//! - Own the ban registry, rate window, route filter and connection registry
//! - Run connection admission in a fixed order
//! - Apply reloaded configuration
//! - Deliver server-originated responses

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::config::ServerConfig;
use crate::health::HealthGate;
use crate::http::handler::RequestHandler;
use crate::http::response::{ResponseData, ResponseTarget};
use crate::net::connection::{ConnectionRegistry, SocketId};
use crate::observability::metrics;
use crate::security::{is_valid_peer, BanRegistry, RatePolicy, RateVerdict, RateWindow, RouteFilter};

/// Outcome of admission for one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    InvalidIp,
    Banned,
    RateLimited,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::InvalidIp => "invalid_ip",
            Admission::Banned => "banned",
            Admission::RateLimited => "rate_limited",
        }
    }
}

pub struct ServerContext {
    config: ArcSwap<ServerConfig>,
    pub bans: BanRegistry,
    pub rates: RateWindow,
    pub filter: RouteFilter,
    pub connections: ConnectionRegistry,
    handler: Arc<dyn RequestHandler>,
    health: HealthGate,
}

impl ServerContext {
    pub fn new(config: ServerConfig, handler: Arc<dyn RequestHandler>, health: HealthGate) -> Self {
        let filter = RouteFilter::with_lists(
            config.filter.routes.iter().cloned(),
            config.filter.blacklisted_keywords.iter().cloned(),
        );
        Self {
            config: ArcSwap::from_pointee(config),
            bans: BanRegistry::new(),
            rates: RateWindow::new(),
            filter,
            connections: ConnectionRegistry::new(),
            handler,
            health,
        }
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }

    pub fn health(&self) -> &HealthGate {
        &self.health
    }

    fn rate_policy(config: &ServerConfig) -> RatePolicy {
        RatePolicy {
            window: config.admission.rolling_window(),
            min_spacing: config.admission.min_spacing(),
        }
    }

    pub fn admit(&self, ip: IpAddr) -> Admission {
        self.admit_at(ip, Instant::now())
    }

    /// Peer sanity, then bans, then the rate window. A rate violation bans
    /// the IP for the configured period.
    pub fn admit_at(&self, ip: IpAddr, now: Instant) -> Admission {
        let ip = ip.to_canonical();
        if !is_valid_peer(ip) {
            return Admission::InvalidIp;
        }
        if self.bans.is_banned_at(ip, now) {
            return Admission::Banned;
        }

        let config = self.config.load();
        match self.rates.check_at(ip, Self::rate_policy(&config), now) {
            RateVerdict::Allowed => Admission::Admitted,
            RateVerdict::Violation => {
                tracing::warn!(ip = %ip, "Connection rate exceeded, banning");
                self.bans.ban_at(ip, Some(config.admission.ban_duration()), now);
                metrics::record_ban("rate");
                Admission::RateLimited
            }
        }
    }

    /// Ban `ip` and drop its live connections.
    pub fn ban(&self, ip: IpAddr, duration: Option<Duration>, reason: &'static str) {
        let ip = ip.to_canonical();
        self.bans.ban(ip, duration);
        metrics::record_ban(reason);
        let dropped = self.connections.disconnect_ip(ip);
        tracing::debug!(ip = %ip, reason, dropped_connections = dropped, "Ban applied");
    }

    pub fn unban(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        let removed = self.bans.unban(ip);
        self.rates.forget(ip);
        removed
    }

    /// Periodic cleanup of expired bans and idle rate entries.
    pub fn housekeep(&self) {
        let now = Instant::now();
        let window = self.config.load().admission.rolling_window();
        let purged = self.bans.purge_expired(now);
        let swept = self.rates.sweep(now, window);
        if purged > 0 || swept > 0 {
            tracing::debug!(purged_bans = purged, swept_ips = swept, "Housekeeping");
        }
    }

    /// Swap in a reloaded configuration. Bind settings only take effect on the
    /// next listener start.
    pub fn apply_config(&self, config: ServerConfig) {
        let current = self.config.load();
        if current.bind_address() != config.bind_address()
            || current.listener.max_connections != config.listener.max_connections
        {
            tracing::warn!("Bind settings changed; restart the listener to apply them");
        }
        self.filter.replace(
            config.filter.routes.iter().cloned(),
            config.filter.blacklisted_keywords.iter().cloned(),
        );
        self.config.store(Arc::new(config));
        tracing::info!(
            routes = self.filter.routes().len(),
            keywords = self.filter.keywords().len(),
            "Configuration applied"
        );
    }

    /// Queue a response for delivery. Returns how many connections took it.
    pub fn send(&self, target: ResponseTarget, response: ResponseData) -> usize {
        match target {
            ResponseTarget::Socket(socket) => self
                .connections
                .find_socket(socket)
                .map_or(0, |connection| usize::from(connection.deliver(response))),
            ResponseTarget::Ip(ip) => {
                let synthetic = self.connections.register_synthetic(ip);
                let delivered = self
                    .connections
                    .inbound_for_ip(ip)
                    .iter()
                    .filter(|connection| connection.deliver(response.clone()))
                    .count();
                self.connections.deregister(synthetic.id());
                delivered
            }
        }
    }

    pub fn disconnect_socket(&self, socket: SocketId) -> bool {
        self.connections.disconnect_socket(socket)
    }

    pub fn disconnect_ip(&self, ip: IpAddr) -> usize {
        self.connections.disconnect_ip(ip.to_canonical())
    }

    pub fn clear_all_users(&self) -> usize {
        let dropped = self.connections.clear();
        tracing::info!(dropped_connections = dropped, "All connections cleared");
        dropped
    }

    pub fn clear_all_routes(&self) {
        self.filter.clear_routes();
        tracing::info!("All routes cleared");
    }
}
