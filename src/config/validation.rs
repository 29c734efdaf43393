//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check the tunnel section is complete when the tunnel is required
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use crate::config::schema::ServerConfig;

/// Lowest bindable port. 1-1023 need elevated privileges but are allowed.
pub const MIN_PORT: u32 = 1;
/// Highest port representable in a TCP header.
pub const MAX_PORT: u32 = 65_535;
/// Longest timed ban: one year. Longer bans should be permanent.
pub const MAX_BAN_MINUTES: u64 = 365 * 24 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyName,
    #[error("server.port {0} is outside 1-65535")]
    PortOutOfRange(u32),
    #[error("server.ip '{0}' is not a valid IP address")]
    InvalidIp(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("filter route '{0}' must start with '/'")]
    InvalidRoute(String),
    #[error("tunnel.{0} must be set when tunnel.required is true")]
    MissingTunnelField(&'static str),
    #[error("admission.ban_minutes {0} exceeds 525600")]
    BanTooLong(u64),
    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,
}

/// Check a port number against the bindable range.
pub fn validate_port(port: u32) -> Result<u16, ValidationError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ValidationError::PortOutOfRange(port))
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    if let Err(e) = validate_port(config.server.port) {
        errors.push(e);
    }
    if config.server.ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidIp(config.server.ip.clone()));
    }

    let positive = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("limits.max_payload_bytes", config.limits.max_payload_bytes as u64),
        ("limits.idle_timeout_secs", config.limits.idle_timeout_secs),
        ("admission.rolling_window_secs", config.admission.rolling_window_secs),
        ("admission.ban_minutes", config.admission.ban_minutes),
        ("health.retry_interval_secs", config.health.retry_interval_secs),
        ("health.probe_timeout_ms", config.health.probe_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.admission.ban_minutes > MAX_BAN_MINUTES {
        errors.push(ValidationError::BanTooLong(config.admission.ban_minutes));
    }

    for route in &config.filter.routes {
        if !route.starts_with('/') {
            errors.push(ValidationError::InvalidRoute(route.clone()));
        }
    }

    if config.tunnel.required {
        if config.tunnel.name.trim().is_empty() {
            errors.push(ValidationError::MissingTunnelField("name"));
        }
        if config.tunnel.executable.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTunnelField("executable"));
        }
        if config.tunnel.config_dir.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTunnelField("config_dir"));
        }
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn port_bounds() {
        assert_eq!(validate_port(0), Err(ValidationError::PortOutOfRange(0)));
        assert_eq!(validate_port(1), Ok(1));
        assert_eq!(validate_port(65_535), Ok(65_535));
        assert_eq!(
            validate_port(65_536),
            Err(ValidationError::PortOutOfRange(65_536))
        );
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.server.name = " ".into();
        config.server.port = 0;
        config.server.ip = "not-an-ip".into();
        config.limits.max_payload_bytes = 0;
        config.filter.routes = vec!["api".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::PortOutOfRange(0)));
        assert!(errors.contains(&ValidationError::Zero("limits.max_payload_bytes")));
        assert!(errors.contains(&ValidationError::InvalidRoute("api".into())));
    }

    #[test]
    fn ban_minutes_bounded() {
        let mut config = ServerConfig::default();
        config.admission.ban_minutes = MAX_BAN_MINUTES;
        assert_eq!(validate_config(&config), Ok(()));

        config.admission.ban_minutes = u64::MAX;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::BanTooLong(u64::MAX)])
        );
        assert_eq!(config.admission.ban_duration(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn required_tunnel_needs_fields() {
        let mut config = ServerConfig::default();
        config.tunnel.required = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
