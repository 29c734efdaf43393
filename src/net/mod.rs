//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limit, admission)
//!     → connection.rs (registry entry, stop signal, outbound queue)
//!     → worker.rs (request loop until close)
//!
//! Connection lifecycle:
//!     Registered → Serving → Deregistered
//!     (forced disconnect jumps straight to Deregistered)
//! ```
//!
//! # Design Decisions
//! - Refuse at capacity instead of queueing in the backlog
//! - Each connection tracked for forced disconnect and shutdown

pub mod connection;
pub mod listener;
pub mod worker;
