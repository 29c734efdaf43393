//! HTTP layer subsystem.
//!
//! # Data Flow
//! ```text
//! Bytes from an admitted connection
//!     → request.rs (bounded read, head parse, body framing)
//!     → RouteFilter verdict (security::filter)
//!     → handler.rs (application RequestHandler)
//!     → response.rs (status overrides, modifiers, wire bytes)
//!         content_type.rs supplies Content-Type values
//! ```
//!
//! # Design Decisions
//! - HTTP/1.0 and HTTP/1.1 only, hand-parsed, no upgrade paths
//! - Framing ambiguity closes the connection instead of guessing
//! - Responses always carry an explicit length or are 204

pub mod content_type;
pub mod handler;
pub mod request;
pub mod response;

pub use content_type::ContentType;
pub use handler::{HandlerError, RequestHandler, StatusPage};
pub use request::{ReadError, ReadLimits, RequestData, RequestReader};
pub use response::{
    render, send_response, RenderOptions, ResponseData, ResponseTarget, ResponseType, SendModifier,
};
