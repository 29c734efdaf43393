//! Request and connection limits.
//!
//! Defaults for every transport-level budget the listener and workers enforce.
//! The config schema seeds itself from these; nothing reads them at runtime
//! except through a loaded `ServerConfig`.
//!
//! # Design Decisions
//! - Limits checked before full parsing (early rejection)
//! - Oversized requests get 413 Payload Too Large and a forced close

use std::time::Duration;

/// How long an IP stays banned after a rate or payload violation.
pub const TIME_OUT_PERIOD: Duration = Duration::from_secs(10 * 60);

/// How far back connection attempts are remembered per IP.
pub const ROLLING_WINDOW: Duration = Duration::from_secs(5);

/// Shortest allowed gap between two connection attempts from one IP.
pub const MIN_PACKET_SPACING: Duration = Duration::from_millis(200);

/// Inactivity window before an incomplete or idle connection is dropped.
pub const ACCEPT_WAIT_TIME: Duration = Duration::from_secs(60);

/// Upper bound on head plus body bytes for a single request.
pub const MAX_TOTAL_PAYLOAD_SIZE_BYTES: usize = 8192;

/// Live inbound connections beyond this are refused.
pub const MAX_ACTIVE_CONNECTIONS: usize = 1000;

/// Accept loop back-off while the process is unhealthy.
pub const SERVER_HEALTH_SLEEP: Duration = Duration::from_secs(1);
