//! Metrics collection and exposition.
//!
//! # Metrics
//! - `warden_connections_accepted_total` (counter): admitted connections
//! - `warden_connections_rejected_total` (counter): by reason
//! - `warden_bans_total` (counter): by reason
//! - `warden_active_connections` (gauge): registered inbound connections
//! - `warden_responses_total` (counter): by status
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_accepted() {
    counter!("warden_connections_accepted_total").increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("warden_connections_rejected_total", "reason" => reason).increment(1);
}

pub fn record_ban(reason: &'static str) {
    counter!("warden_bans_total", "reason" => reason).increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!("warden_active_connections").set(count as f64);
}

pub fn record_response(status: u16) {
    counter!("warden_responses_total", "status" => status.to_string()).increment(1);
}
