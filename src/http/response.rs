//! Response classification and rendering.
//!
//! # Responsibilities
//! - Map response types and delivery modifiers to and from strings
//! - Apply rendering-time status overrides (empty payload, failed generation)
//! - Serialize status line, headers and body onto a writer
//!
//! # Design Decisions
//! - Force-close beats every other modifier
//! - Unknown strings map to an explicit `Invalid` value, never a default
//! - An `Invalid` response type renders as 500

use std::collections::BTreeSet;
use std::net::IpAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::content_type::ContentType;
use crate::net::connection::SocketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseType {
    Invalid,
    Ok,
    NoContent,
    PartialContent,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    ImATeapot,
    InternalServerError,
    ServiceUnavailable,
    HttpVersionNotSupported,
}

impl ResponseType {
    pub const ALL: [ResponseType; 12] = [
        ResponseType::Ok,
        ResponseType::NoContent,
        ResponseType::PartialContent,
        ResponseType::BadRequest,
        ResponseType::Unauthorized,
        ResponseType::NotFound,
        ResponseType::MethodNotAllowed,
        ResponseType::PayloadTooLarge,
        ResponseType::ImATeapot,
        ResponseType::InternalServerError,
        ResponseType::ServiceUnavailable,
        ResponseType::HttpVersionNotSupported,
    ];

    /// Numeric status code; `None` for `Invalid`.
    pub fn code(self) -> Option<u16> {
        let code = match self {
            ResponseType::Invalid => return None,
            ResponseType::Ok => 200,
            ResponseType::NoContent => 204,
            ResponseType::PartialContent => 206,
            ResponseType::BadRequest => 400,
            ResponseType::Unauthorized => 401,
            ResponseType::NotFound => 404,
            ResponseType::MethodNotAllowed => 405,
            ResponseType::PayloadTooLarge => 413,
            ResponseType::ImATeapot => 418,
            ResponseType::InternalServerError => 500,
            ResponseType::ServiceUnavailable => 503,
            ResponseType::HttpVersionNotSupported => 505,
        };
        Some(code)
    }

    pub fn from_code(code: u16) -> ResponseType {
        Self::ALL
            .into_iter()
            .find(|ty| ty.code() == Some(code))
            .unwrap_or(ResponseType::Invalid)
    }

    pub fn reason(self) -> &'static str {
        match self {
            ResponseType::Invalid => "Invalid",
            ResponseType::Ok => "OK",
            ResponseType::NoContent => "No Content",
            ResponseType::PartialContent => "Partial Content",
            ResponseType::BadRequest => "Bad Request",
            ResponseType::Unauthorized => "Unauthorized",
            ResponseType::NotFound => "Not Found",
            ResponseType::MethodNotAllowed => "Method Not Allowed",
            ResponseType::PayloadTooLarge => "Payload Too Large",
            ResponseType::ImATeapot => "I'm a teapot",
            ResponseType::InternalServerError => "Internal Server Error",
            ResponseType::ServiceUnavailable => "Service Unavailable",
            ResponseType::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// String form used by config and the admin API: the bare code, or
    /// `"invalid"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Invalid => "invalid",
            ResponseType::Ok => "200",
            ResponseType::NoContent => "204",
            ResponseType::PartialContent => "206",
            ResponseType::BadRequest => "400",
            ResponseType::Unauthorized => "401",
            ResponseType::NotFound => "404",
            ResponseType::MethodNotAllowed => "405",
            ResponseType::PayloadTooLarge => "413",
            ResponseType::ImATeapot => "418",
            ResponseType::InternalServerError => "500",
            ResponseType::ServiceUnavailable => "503",
            ResponseType::HttpVersionNotSupported => "505",
        }
    }

    /// Success statuses that are expected to carry a body.
    pub fn carries_payload(self) -> bool {
        matches!(self, ResponseType::Ok | ResponseType::PartialContent)
    }
}

impl From<&str> for ResponseType {
    fn from(input: &str) -> Self {
        input
            .trim()
            .parse::<u16>()
            .map_or(ResponseType::Invalid, ResponseType::from_code)
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional delivery behaviour attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SendModifier {
    Invalid,
    /// `Content-Disposition: attachment`.
    Download,
    /// Tell the client and intermediaries not to cache.
    NoCache,
    /// Close the socket after sending. Overrides every other modifier.
    ForceClose,
}

impl SendModifier {
    pub const ALL: [SendModifier; 3] = [
        SendModifier::Download,
        SendModifier::NoCache,
        SendModifier::ForceClose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SendModifier::Invalid => "invalid",
            SendModifier::Download => "download",
            SendModifier::NoCache => "no-cache",
            SendModifier::ForceClose => "force-close",
        }
    }
}

impl From<&str> for SendModifier {
    fn from(input: &str) -> Self {
        let input = input.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(input))
            .unwrap_or(SendModifier::Invalid)
    }
}

impl std::fmt::Display for SendModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a server-originated response should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTarget {
    /// One inbound connection, by its socket handle.
    Socket(SocketId),
    /// Every inbound connection from this IP.
    Ip(IpAddr),
}

/// A response to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    pub response_type: ResponseType,
    pub content_type: ContentType,
    pub modifiers: BTreeSet<SendModifier>,
    pub body: Vec<u8>,
    /// Set by the producer when body generation failed; renders as 500.
    pub generation_failed: bool,
}

impl ResponseData {
    pub fn new(response_type: ResponseType, content_type: ContentType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            response_type,
            content_type,
            modifiers: BTreeSet::new(),
            body: body.into(),
            generation_failed: false,
        }
    }

    /// A bare status with a placeholder body.
    pub fn status(response_type: ResponseType) -> Self {
        Self::new(response_type, ContentType::Plain, Vec::new())
    }

    pub fn ok(content_type: ContentType, body: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseType::Ok, content_type, body)
    }

    pub fn server_error() -> Self {
        Self::status(ResponseType::InternalServerError)
    }

    pub fn with_modifier(mut self, modifier: SendModifier) -> Self {
        if modifier != SendModifier::Invalid {
            self.modifiers.insert(modifier);
        }
        self
    }

    pub fn failed(mut self) -> Self {
        self.generation_failed = true;
        self
    }

    pub fn has(&self, modifier: SendModifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn force_close(&self) -> bool {
        self.has(SendModifier::ForceClose)
    }

    /// The status that actually goes on the wire.
    pub fn effective_status(&self) -> ResponseType {
        if self.generation_failed || self.response_type == ResponseType::Invalid {
            return ResponseType::InternalServerError;
        }
        if self.response_type.carries_payload() && self.body.is_empty() {
            return ResponseType::NoContent;
        }
        self.response_type
    }
}

/// Per-send rendering settings.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Value of the `Server` header.
    pub server_name: &'a str,
    /// The connection will close after this response regardless of modifiers
    /// (client asked for it).
    pub closing: bool,
}

/// Render a response to wire bytes.
pub fn render(data: &ResponseData, options: RenderOptions<'_>) -> Vec<u8> {
    let status = data.effective_status();
    let code = status.code().unwrap_or(500);
    let force_close = data.force_close();

    let mut head = format!("HTTP/1.1 {} {}\r\n", code, status.reason());
    head.push_str(&format!("Server: {}\r\n", options.server_name));

    if force_close || options.closing {
        head.push_str("Connection: close\r\n");
    } else {
        head.push_str("Connection: keep-alive\r\n");
    }

    if !force_close {
        if data.has(SendModifier::Download) {
            head.push_str("Content-Disposition: attachment\r\n");
        }
        if data.has(SendModifier::NoCache) {
            head.push_str("Cache-Control: no-store, no-cache, must-revalidate\r\n");
            head.push_str("Pragma: no-cache\r\n");
            head.push_str("Expires: 0\r\n");
        }
    }

    if status == ResponseType::NoContent {
        head.push_str("\r\n");
        return head.into_bytes();
    }

    // Overridden statuses and empty non-payload responses get a placeholder.
    let (content_type, body): (ContentType, Vec<u8>) = if status != data.response_type || data.body.is_empty() {
        (
            ContentType::Plain,
            format!("{} {}", code, status.reason()).into_bytes(),
        )
    } else {
        (data.content_type, data.body.clone())
    };

    head.push_str(&format!("Content-Type: {}\r\n", content_type.header_value()));
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    let mut out = head.into_bytes();
    out.extend_from_slice(&body);
    out
}

/// Render `data` and write it to `writer`, flushing afterwards.
pub async fn send_response<W>(
    writer: &mut W,
    data: &ResponseData,
    options: RenderOptions<'_>,
) -> std::io::Result<ResponseType>
where
    W: AsyncWrite + Unpin,
{
    let bytes = render(data, options);
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(data.effective_status())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: RenderOptions<'static> = RenderOptions {
        server_name: "test",
        closing: false,
    };

    fn rendered(data: &ResponseData) -> String {
        String::from_utf8(render(data, OPTIONS)).unwrap()
    }

    #[test]
    fn response_type_strings_round_trip() {
        for ty in ResponseType::ALL {
            assert_eq!(ResponseType::from(ty.as_str()), ty);
            assert_eq!(ResponseType::from_code(ty.code().unwrap()), ty);
        }
    }

    #[test]
    fn unknown_response_type_is_invalid() {
        for input in ["", "OK", "201", "2000", "invalid", "-1"] {
            assert_eq!(ResponseType::from(input), ResponseType::Invalid, "{input}");
        }
    }

    #[test]
    fn modifier_strings_round_trip() {
        for m in SendModifier::ALL {
            assert_eq!(SendModifier::from(m.as_str()), m);
        }
        assert_eq!(SendModifier::from("NO-CACHE"), SendModifier::NoCache);
        assert_eq!(SendModifier::from("gzip"), SendModifier::Invalid);
        assert_eq!(SendModifier::from("invalid"), SendModifier::Invalid);
    }

    #[test]
    fn empty_success_becomes_no_content() {
        for ty in [ResponseType::Ok, ResponseType::PartialContent] {
            let data = ResponseData::new(ty, ContentType::Html, Vec::new());
            let text = rendered(&data);
            assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"), "{text}");
            assert!(!text.contains("Content-Length"));
            assert!(text.ends_with("\r\n\r\n"));
        }
    }

    #[test]
    fn failed_generation_becomes_server_error() {
        let data = ResponseData::ok(ContentType::Html, "<p>half</p>").failed();
        let text = rendered(&data);
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.ends_with("500 Internal Server Error"));
        assert!(!text.contains("<p>half</p>"));
    }

    #[test]
    fn invalid_type_renders_as_server_error() {
        let data = ResponseData::new(ResponseType::Invalid, ContentType::Plain, "x");
        assert_eq!(data.effective_status(), ResponseType::InternalServerError);
    }

    #[test]
    fn payload_is_rendered_with_length() {
        let data = ResponseData::ok(ContentType::Json, "{\"a\":1}");
        let text = rendered(&data);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: test\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 7\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn error_status_gets_placeholder_body() {
        let text = rendered(&ResponseData::status(ResponseType::NotFound));
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("\r\n\r\n404 Not Found"));
    }

    #[test]
    fn no_cache_and_download_headers() {
        let data = ResponseData::ok(ContentType::Zip, vec![1, 2, 3])
            .with_modifier(SendModifier::NoCache)
            .with_modifier(SendModifier::Download);
        let text = String::from_utf8_lossy(&render(&data, OPTIONS)).into_owned();
        assert!(text.contains("Content-Disposition: attachment\r\n"));
        assert!(text.contains("Cache-Control: no-store, no-cache, must-revalidate\r\n"));
        assert!(text.contains("Pragma: no-cache\r\n"));
        assert!(text.contains("Expires: 0\r\n"));
    }

    #[test]
    fn force_close_suppresses_other_modifiers() {
        let data = ResponseData::ok(ContentType::Plain, "bye")
            .with_modifier(SendModifier::NoCache)
            .with_modifier(SendModifier::Download)
            .with_modifier(SendModifier::ForceClose);
        let text = rendered(&data);
        assert!(text.contains("Connection: close\r\n"));
        assert!(!text.contains("keep-alive"));
        assert!(!text.contains("Content-Disposition"));
        assert!(!text.contains("Cache-Control"));
        assert!(!text.contains("Pragma"));
        assert!(!text.contains("Expires"));
    }

    #[test]
    fn invalid_modifier_is_ignored() {
        let data = ResponseData::ok(ContentType::Plain, "x").with_modifier(SendModifier::Invalid);
        assert!(data.modifiers.is_empty());
    }

    #[test]
    fn closing_option_sets_connection_close_only() {
        let data = ResponseData::ok(ContentType::Plain, "x").with_modifier(SendModifier::NoCache);
        let text = String::from_utf8(render(
            &data,
            RenderOptions {
                server_name: "test",
                closing: true,
            },
        ))
        .unwrap();
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Pragma: no-cache\r\n"));
    }

    #[tokio::test]
    async fn send_response_writes_all_bytes() {
        let mut sink: Vec<u8> = Vec::new();
        let status = send_response(&mut sink, &ResponseData::status(ResponseType::ImATeapot), OPTIONS)
            .await
            .unwrap();
        assert_eq!(status, ResponseType::ImATeapot);
        assert!(sink.starts_with(b"HTTP/1.1 418 I'm a teapot\r\n"));
    }
}
