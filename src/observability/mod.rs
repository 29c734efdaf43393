//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener, workers, admin API produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Admission rejections are logged at debug, never per-byte
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
