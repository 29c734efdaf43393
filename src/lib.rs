//! Embeddable HTTP/1.1 server core with connection admission control.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ admission ──▶ net::worker ──▶ http::request
//!                 │  capacity      ip / ban / rate     │            │
//!                 ▼                                     ▼            ▼
//!            refuse/drop                        security::filter  http::handler
//!                                                       │            │
//!   client ◀────────────────── http::response ◀─────────┴────────────┘
//!
//!   server::ServerCore   initialize / ready / healthy / shutdown
//!   health               reachability probe + tunnel collaborator
//!   admin                bearer-token HTTP API over ServerContext
//! ```

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod server;

pub use config::schema::ServerConfig;
pub use http::{RequestData, RequestHandler, ResponseData};
pub use lifecycle::Shutdown;
pub use server::{ServerContext, ServerCore, ServerError};
