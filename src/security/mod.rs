//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted socket:
//!     → is_valid_peer (address sanity)
//!     → ban.rs (banned IPs, lazy expiry)
//!     → rate_limit.rs (connection spacing per IP)
//!     → Hand off to a connection worker
//!
//! Parsed request:
//!     → limits.rs budgets already enforced by the reader
//!     → filter.rs (keyword blacklist, then route allow-list)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - Abusive clients get a silent close, not a response

pub mod ban;
pub mod filter;
pub mod limits;
pub mod rate_limit;

use std::net::IpAddr;

pub use ban::{BanInfo, BanRegistry, BannedIp};
pub use filter::{RouteFilter, RouteVerdict};
pub use rate_limit::{RatePolicy, RateVerdict, RateWindow};

/// Parse an IP address string as given by an administrator. IPv4-mapped
/// IPv6 addresses come back as plain IPv4, matching what admission tracks.
pub fn parse_ip(input: &str) -> Option<IpAddr> {
    input.trim().parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}

/// Returns true if `input` is syntactically an IPv4 or IPv6 address.
pub fn is_valid_ip(input: &str) -> bool {
    parse_ip(input).is_some()
}

/// A peer address that can be tracked. Unspecified and broadcast sources
/// cannot belong to a real client.
pub fn is_valid_peer(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_unspecified() && !v4.is_broadcast(),
        IpAddr::V6(v6) => !v6.is_unspecified(),
    }
}
