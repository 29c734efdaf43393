//! Request intake: bounded reading, head parsing and body framing.
//!
//! # Responsibilities
//! - Read one request at a time from a connection, within a byte budget
//!   and an inactivity window
//! - Parse the request line and headers into `RequestData`
//! - Decode Content-Length and chunked bodies
//!
//! # Design Decisions
//! - Any framing ambiguity is an error, never a guess: once the body length
//!   is in doubt the next request boundary is unknowable
//! - Bytes past the current request stay buffered for the next call
//!   (pipelining and keep-alive)
//! - The head must be valid UTF-8

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Malformed request line or headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request line")]
    RequestLine,
    #[error("invalid header line")]
    Header,
    #[error("request head is not valid UTF-8")]
    Encoding,
    #[error("unsupported HTTP version {0}")]
    Version(String),
}

/// The body length cannot be determined safely.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("both Content-Length and Transfer-Encoding present")]
    Ambiguous,
    #[error("invalid or conflicting Content-Length")]
    ContentLength,
    #[error("unsupported Transfer-Encoding")]
    TransferEncoding,
    #[error("invalid chunk size")]
    ChunkSize,
    #[error("chunk data not followed by CRLF")]
    ChunkTerminator,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("no data within the inactivity window")]
    Idle,
    #[error("request exceeds the payload limit")]
    TooLarge,
    #[error("connection closed mid-request")]
    Truncated,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed view of one request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestData {
    pub method: String,
    /// Request target exactly as received.
    pub target: String,
    /// Path component of the target.
    pub route: String,
    pub http_version: String,
    pub host: String,
    /// Header names as received; the last duplicate wins.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RequestData {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the client expects the connection to close after the response.
    pub fn wants_close(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match connection.as_deref() {
            Some(v) if v.split(',').any(|t| t.trim() == "close") => true,
            Some(v) if v.split(',').any(|t| t.trim() == "keep-alive") => false,
            _ => self.http_version == "HTTP/1.0",
        }
    }

    /// Host header without a port.
    pub fn host_name(&self) -> &str {
        let host = self.host.trim();
        if let Some(rest) = host.strip_prefix('[') {
            return rest.split(']').next().unwrap_or_default();
        }
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    }
}

/// Request line and headers before the body has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Head {
    method: String,
    target: String,
    version: String,
    headers: Vec<(String, String)>,
    /// Bytes consumed including the blank line.
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    None,
    Length(usize),
    Chunked,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Parse the head if the buffer holds a complete one.
fn parse_head(buf: &[u8]) -> Result<Option<Head>, ParseError> {
    // Tolerate stray CRLFs between pipelined requests.
    let skip = buf
        .chunks(2)
        .take_while(|pair| *pair == b"\r\n")
        .count()
        * 2;
    let Some(end) = find(&buf[skip..], b"\r\n\r\n") else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[skip..skip + end]).map_err(|_| ParseError::Encoding)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::RequestLine)?;
    let mut parts = request_line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::RequestLine);
    };
    if !is_token(method) || target.is_empty() || target.bytes().any(|b| b.is_ascii_control()) {
        return Err(ParseError::RequestLine);
    }
    match version {
        "HTTP/1.1" | "HTTP/1.0" => {}
        v if v.starts_with("HTTP/") => return Err(ParseError::Version(v.to_string())),
        _ => return Err(ParseError::RequestLine),
    }

    let mut headers = Vec::new();
    for line in lines {
        // Obsolete line folding is a smuggling vector.
        if line.starts_with(' ') || line.starts_with('\t') {
            return Err(ParseError::Header);
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::Header)?;
        if !is_token(name) {
            return Err(ParseError::Header);
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(Some(Head {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        len: skip + end + 4,
    }))
}

fn body_framing(headers: &[(String, String)]) -> Result<BodyFraming, FramingError> {
    let mut length: Option<usize> = None;
    let mut chunked = false;

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-length") {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FramingError::ContentLength);
            }
            let parsed: usize = value.parse().map_err(|_| FramingError::ContentLength)?;
            match length {
                Some(previous) if previous != parsed => return Err(FramingError::ContentLength),
                _ => length = Some(parsed),
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            if !value.eq_ignore_ascii_case("chunked") || chunked {
                return Err(FramingError::TransferEncoding);
            }
            chunked = true;
        }
    }

    match (length, chunked) {
        (Some(_), true) => Err(FramingError::Ambiguous),
        (None, true) => Ok(BodyFraming::Chunked),
        (Some(0), false) | (None, false) => Ok(BodyFraming::None),
        (Some(n), false) => Ok(BodyFraming::Length(n)),
    }
}

fn is_hex_prefix(line: &[u8]) -> bool {
    let size = line.split(|&b| b == b';').next().unwrap_or_default();
    size.len() <= 16 && size.iter().all(u8::is_ascii_hexdigit)
}

/// Decode a chunked body. `Ok(None)` means more bytes are needed; on success
/// returns the body and the bytes consumed including trailers.
fn decode_chunked(data: &[u8], limit: usize) -> Result<Option<(Vec<u8>, usize)>, ReadError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let Some(line_end) = find(&data[pos..], b"\r\n") else {
            if !is_hex_prefix(&data[pos..]) {
                return Err(FramingError::ChunkSize.into());
            }
            return Ok(None);
        };
        let line = &data[pos..pos + line_end];
        let size_field = line.split(|&b| b == b';').next().unwrap_or_default();
        if size_field.is_empty() || !is_hex_prefix(line) {
            return Err(FramingError::ChunkSize.into());
        }
        let size_text = std::str::from_utf8(size_field).map_err(|_| FramingError::ChunkSize)?;
        let size = usize::from_str_radix(size_text, 16).map_err(|_| FramingError::ChunkSize)?;
        pos += line_end + 2;

        if size == 0 {
            // Trailer section ends at an empty line.
            loop {
                let Some(trailer_end) = find(&data[pos..], b"\r\n") else {
                    return Ok(None);
                };
                pos += trailer_end + 2;
                if trailer_end == 0 {
                    return Ok(Some((body, pos)));
                }
            }
        }

        if size > limit.saturating_sub(body.len()) {
            return Err(ReadError::TooLarge);
        }
        if data.len() < pos + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&data[pos..pos + size]);
        if &data[pos + size..pos + size + 2] != b"\r\n" {
            return Err(FramingError::ChunkTerminator.into());
        }
        pos += size + 2;
    }
}

fn route_of(target: &str) -> String {
    let path = match target.find("://") {
        Some(scheme_end) => {
            let after = &target[scheme_end + 3..];
            after.find('/').map_or("/", |slash| &after[slash..])
        }
        None => target,
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].to_string()
}

impl RequestData {
    fn from_head(head: Head, body: Vec<u8>) -> Self {
        let mut headers = HashMap::with_capacity(head.headers.len());
        let mut host = String::new();
        for (name, value) in head.headers {
            if name.eq_ignore_ascii_case("host") {
                host = value.clone();
            }
            headers.insert(name, value);
        }
        Self {
            route: route_of(&head.target),
            method: head.method,
            target: head.target,
            http_version: head.version,
            host,
            headers,
            body,
        }
    }
}

/// Budgets applied while reading.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    /// Head plus body bytes allowed per request.
    pub max_payload: usize,
    /// Longest silence tolerated while waiting for bytes.
    pub idle_timeout: Duration,
}

/// Reads consecutive requests from one connection.
#[derive(Debug)]
pub struct RequestReader {
    buf: Vec<u8>,
    limits: ReadLimits,
}

impl RequestReader {
    pub fn new(limits: ReadLimits) -> Self {
        Self {
            buf: Vec::with_capacity(READ_CHUNK),
            limits,
        }
    }

    /// Bytes received but not yet consumed by a request.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read the next request. `Ok(None)` when the peer closed cleanly between
    /// requests.
    ///
    /// Cancel safe: bytes already read stay buffered if the future is dropped.
    pub async fn next_request<R>(&mut self, io: &mut R) -> Result<Option<RequestData>, ReadError>
    where
        R: AsyncRead + Unpin,
    {
        let max = self.limits.max_payload;

        let head = loop {
            if let Some(head) = parse_head(&self.buf)? {
                break head;
            }
            if self.buf.len() >= max {
                return Err(ReadError::TooLarge);
            }
            if !self.fill(io).await? {
                return if self.buf.iter().all(|b| matches!(b, b'\r' | b'\n')) {
                    Ok(None)
                } else {
                    Err(ReadError::Truncated)
                };
            }
        };
        if head.len > max {
            return Err(ReadError::TooLarge);
        }

        let (body, consumed) = match body_framing(&head.headers)? {
            BodyFraming::None => (Vec::new(), head.len),
            BodyFraming::Length(n) => {
                if n > max - head.len {
                    return Err(ReadError::TooLarge);
                }
                let end = head.len + n;
                while self.buf.len() < end {
                    if !self.fill(io).await? {
                        return Err(ReadError::Truncated);
                    }
                }
                (self.buf[head.len..end].to_vec(), end)
            }
            BodyFraming::Chunked => loop {
                if let Some((body, used)) = decode_chunked(&self.buf[head.len..], max - head.len)? {
                    break (body, head.len + used);
                }
                if self.buf.len() - head.len >= max - head.len + READ_CHUNK {
                    return Err(ReadError::TooLarge);
                }
                if !self.fill(io).await? {
                    return Err(ReadError::Truncated);
                }
            },
        };

        self.buf.drain(..consumed);
        Ok(Some(RequestData::from_head(head, body)))
    }

    async fn fill<R>(&mut self, io: &mut R) -> Result<bool, ReadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let n = tokio::time::timeout(self.limits.idle_timeout, io.read(&mut chunk))
            .await
            .map_err(|_| ReadError::Idle)??;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const LIMITS: ReadLimits = ReadLimits {
        max_payload: 8192,
        idle_timeout: Duration::from_millis(200),
    };

    async fn read_one(raw: &[u8]) -> Result<Option<RequestData>, ReadError> {
        let mut reader = RequestReader::new(LIMITS);
        let mut io = raw;
        reader.next_request(&mut io).await
    }

    #[tokio::test]
    async fn parses_simple_get() {
        let req = read_one(b"GET /index.html?lang=en HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\n\r\n")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/index.html?lang=en");
        assert_eq!(req.route, "/index.html");
        assert_eq!(req.http_version, "HTTP/1.1");
        assert_eq!(req.host, "example.com:8080");
        assert_eq!(req.host_name(), "example.com");
        assert_eq!(req.header("accept"), Some("*/*"));
        assert!(req.body.is_empty());
        assert!(!req.wants_close());
    }

    #[tokio::test]
    async fn header_keys_case_sensitive_last_write_wins() {
        let req = read_one(b"GET / HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\nX-A: 3\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.headers.get("X-A").map(String::as_str), Some("3"));
        assert_eq!(req.headers.get("x-a").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn reads_content_length_body() {
        let req = read_one(b"POST /form HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.body, b"hello");
    }

    #[tokio::test]
    async fn decodes_chunked_body() {
        let req = read_one(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: t\r\n\r\n",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(req.body, b"Wikipedia");
    }

    #[tokio::test]
    async fn content_length_with_chunked_is_ambiguous() {
        let err = read_one(
            b"POST / HTTP/1.1\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::Ambiguous)));
    }

    #[tokio::test]
    async fn malformed_chunk_size_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nabc\r\n0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::ChunkSize)));
    }

    #[tokio::test]
    async fn chunk_without_terminator_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcdef\r\n0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::ChunkTerminator)));
    }

    #[tokio::test]
    async fn conflicting_content_lengths_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::ContentLength)));

        let err = read_one(b"POST / HTTP/1.1\r\nContent-Length: +3\r\n\r\nabc")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::ContentLength)));
    }

    #[tokio::test]
    async fn non_chunked_transfer_encoding_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Framing(FramingError::TransferEncoding)));
    }

    #[tokio::test]
    async fn short_body_is_truncated() {
        let err = read_one(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Truncated));
    }

    #[tokio::test]
    async fn oversized_declared_body_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nContent-Length: 9000\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::TooLarge));
    }

    #[tokio::test]
    async fn oversized_head_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(9000));
        let err = read_one(&raw).await.unwrap_err();
        assert!(matches!(err, ReadError::TooLarge));
    }

    #[tokio::test]
    async fn oversized_chunked_body_rejected() {
        let err = read_one(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nFFFF\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::TooLarge));
    }

    #[tokio::test]
    async fn malformed_request_lines() {
        for raw in [
            &b"GET /\r\n\r\n"[..],
            b"GET  / HTTP/1.1\r\n\r\n",
            b"G(T / HTTP/1.1\r\n\r\n",
            b"GET / FTP/1.0\r\n\r\n",
        ] {
            let err = read_one(raw).await.unwrap_err();
            assert!(matches!(err, ReadError::Parse(ParseError::RequestLine)), "{raw:?}");
        }
    }

    #[tokio::test]
    async fn unsupported_version_reported() {
        let err = read_one(b"GET / HTTP/2.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ReadError::Parse(ParseError::Version(v)) if v == "HTTP/2.0"));
    }

    #[tokio::test]
    async fn folded_or_spaced_headers_rejected() {
        for raw in [
            &b"GET / HTTP/1.1\r\nX-A: 1\r\n continued\r\n\r\n"[..],
            b"GET / HTTP/1.1\r\nContent-Length : 0\r\n\r\n",
            b"GET / HTTP/1.1\r\nNoColon\r\n\r\n",
        ] {
            let err = read_one(raw).await.unwrap_err();
            assert!(matches!(err, ReadError::Parse(ParseError::Header)), "{raw:?}");
        }
    }

    #[tokio::test]
    async fn clean_close_between_requests() {
        assert!(read_one(b"").await.unwrap().is_none());
        assert!(matches!(read_one(b"GET / HT").await, Err(ReadError::Truncated)));
    }

    #[tokio::test]
    async fn pipelined_requests_stay_buffered() {
        let mut reader = RequestReader::new(LIMITS);
        let mut io: &[u8] = b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nok";

        let first = reader.next_request(&mut io).await.unwrap().unwrap();
        assert_eq!(first.route, "/a");
        let second = reader.next_request(&mut io).await.unwrap().unwrap();
        assert_eq!(second.route, "/b");
        assert_eq!(second.body, b"ok");
        assert!(reader.next_request(&mut io).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let mut reader = RequestReader::new(LIMITS);
        let err = reader.next_request(&mut server).await.unwrap_err();
        assert!(matches!(err, ReadError::Idle));
        drop(client);
    }

    #[test]
    fn absolute_form_target_route() {
        assert_eq!(route_of("http://example.com/a/b?c"), "/a/b");
        assert_eq!(route_of("http://example.com"), "/");
        assert_eq!(route_of("/x#frag"), "/x");
        assert_eq!(route_of("*"), "*");
    }

    #[test]
    fn http10_closes_by_default() {
        let mut req = RequestData {
            http_version: "HTTP/1.0".into(),
            ..Default::default()
        };
        assert!(req.wants_close());
        req.headers.insert("Connection".into(), "keep-alive".into());
        assert!(!req.wants_close());
        req.headers.insert("Connection".into(), "Close".into());
        assert!(req.wants_close());
    }

    #[test]
    fn bracketed_ipv6_host() {
        let req = RequestData {
            host: "[::1]:8080".into(),
            ..Default::default()
        };
        assert_eq!(req.host_name(), "::1");
    }
}
