//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::limits;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Identity and bind settings.
    pub server: ServerSection,

    /// Listener configuration (connection limit).
    pub listener: ListenerConfig,

    /// Per-connection transport limits.
    pub limits: LimitsConfig,

    /// Rate window and ban policy.
    pub admission: AdmissionConfig,

    /// Route allow-list and keyword blacklist.
    pub filter: FilterConfig,

    /// Reachability probe and retry settings.
    pub health: HealthConfig,

    /// Tunnel collaborator settings.
    pub tunnel: TunnelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

impl ServerConfig {
    /// `ip:port` string for the listening socket.
    pub fn bind_address(&self) -> String {
        match self.server.ip.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.server.port),
            _ => format!("{}:{}", self.server.ip, self.server.port),
        }
    }
}

/// Server identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// Name used in logs and in the `Server` response header.
    pub name: String,

    /// Directory the application exposes content from.
    pub root: PathBuf,

    /// Hostnames accepted in the `Host` header. Empty accepts any host.
    pub domains: Vec<String>,

    /// Local IP address to bind.
    pub ip: String,

    /// Local TCP port to bind. Kept wider than `u16` so out-of-range values
    /// surface as validation errors instead of parse errors.
    pub port: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "http-warden".to_string(),
            root: PathBuf::from("."),
            domains: Vec::new(),
            ip: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Maximum concurrent inbound connections.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: limits::MAX_ACTIVE_CONNECTIONS,
        }
    }
}

/// Per-connection transport limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum bytes of head plus body for a single request.
    pub max_payload_bytes: usize,

    /// Seconds a connection may stay silent while a request is pending.
    pub idle_timeout_secs: u64,
}

impl LimitsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: limits::MAX_TOTAL_PAYLOAD_SIZE_BYTES,
            idle_timeout_secs: limits::ACCEPT_WAIT_TIME.as_secs(),
        }
    }
}

/// Rate window and ban policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Seconds of connection history kept per IP.
    pub rolling_window_secs: u64,

    /// Shortest allowed gap between two connection attempts from one IP.
    pub min_spacing_ms: u64,

    /// Ban duration in minutes for rate or payload violations.
    pub ban_minutes: u64,

    /// Ban IPs that exceed the payload limit.
    pub ban_on_oversize: bool,

    /// Ban IPs whose request target hits a blacklisted keyword.
    pub ban_on_blacklist: bool,
}

impl AdmissionConfig {
    pub fn rolling_window(&self) -> Duration {
        Duration::from_secs(self.rolling_window_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_minutes.saturating_mul(60))
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rolling_window_secs: limits::ROLLING_WINDOW.as_secs(),
            min_spacing_ms: limits::MIN_PACKET_SPACING.as_millis() as u64,
            ban_minutes: limits::TIME_OUT_PERIOD.as_secs() / 60,
            ban_on_oversize: true,
            ban_on_blacklist: false,
        }
    }
}

/// Route allow-list and keyword blacklist seeded at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Allowed route prefixes.
    pub routes: Vec<String>,

    /// Substrings that get a request target force-closed.
    pub blacklisted_keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            routes: vec!["/".to_string()],
            blacklisted_keywords: Vec::new(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// `host:port` targets that must accept a TCP connection for the
    /// process to count as online. Empty disables the probe.
    pub reachability_targets: Vec<String>,

    /// Probe connect timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Seconds the accept loop sleeps before re-checking an unhealthy process.
    pub retry_interval_secs: u64,

    /// Seconds a probe result is reused before probing again.
    pub cache_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            reachability_targets: vec!["1.1.1.1:53".to_string()],
            probe_timeout_ms: 2000,
            retry_interval_secs: limits::SERVER_HEALTH_SLEEP.as_secs(),
            cache_secs: 5,
        }
    }
}

/// Tunnel collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// The listener may not accept traffic until the tunnel is ready.
    pub required: bool,

    /// Tunnel name passed to the tunnel executable.
    pub name: String,

    /// Path to the tunnel executable.
    pub executable: PathBuf,

    /// Directory holding the tunnel's `config.yml`.
    pub config_dir: PathBuf,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            name = "site"
            port = 9000

            [filter]
            blacklisted_keywords = [".php", "/wp-"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.name, "site");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.filter.routes, vec!["/".to_string()]);
        assert_eq!(config.filter.blacklisted_keywords.len(), 2);
        assert_eq!(config.limits.max_payload_bytes, 8192);
        assert_eq!(config.admission.min_spacing(), Duration::from_millis(200));
        assert_eq!(config.admission.ban_duration(), Duration::from_secs(600));
    }

    #[test]
    fn bind_address_brackets_ipv6() {
        let mut config = ServerConfig::default();
        config.server.ip = "::1".into();
        config.server.port = 80;
        assert_eq!(config.bind_address(), "[::1]:80");

        config.server.ip = "127.0.0.1".into();
        assert_eq!(config.bind_address(), "127.0.0.1:80");
    }
}
