//! Server core.
//!
//! # Data Flow
//! ```text
//! ServerCore::initialize (validate, seed filter, mark initialized)
//!     → ServerCore::start_listener (ready check, bind, spawn accept loop)
//!     → ServerContext shared by listener, workers and admin API
//!     → ServerCore::shutdown (stop accept, drop connections, stop tunnel)
//! ```

pub mod context;
pub mod core;

pub use self::context::{Admission, ServerContext};
pub use self::core::{ServerCore, ServerError};
