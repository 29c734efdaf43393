//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → held in an ArcSwap by the server context
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → context swaps admission policy and filter lists
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Bind settings (ip, port, connection limit) only apply at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AdmissionConfig, FilterConfig, HealthConfig, LimitsConfig, ListenerConfig,
    ObservabilityConfig, ServerConfig, ServerSection, TunnelConfig,
};
pub use validation::{validate_config, ValidationError};
