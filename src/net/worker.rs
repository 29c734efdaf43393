//! Per-connection worker.
//!
//! # Responsibilities
//! - Read requests under the payload and inactivity budgets
//! - Apply host, keyword and route checks, then call the application handler
//! - Write responses and decide whether the connection stays open
//! - Deliver server-originated responses queued on the connection
//! - Exit promptly on a forced disconnect
//!
//! # Error Policy
//! ```text
//! oversize           → 413 + force-close, optional ban
//! malformed head     → 400 + force-close
//! unsupported version→ 505 + force-close
//! framing ambiguity  → silent close
//! blacklisted target → silent close, optional ban
//! idle / EOF / io    → silent close
//! ```

use std::net::IpAddr;
use std::sync::{Arc, Weak};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::http::handler;
use crate::http::request::{ParseError, ReadError, ReadLimits, RequestData, RequestReader};
use crate::http::response::{render, send_response, RenderOptions, ResponseData, ResponseType, SendModifier};
use crate::net::connection::{Connection, WorkerHandle};
use crate::observability::metrics;
use crate::security::RouteVerdict;
use crate::server::context::ServerContext;

/// Serves one accepted socket until it closes.
pub struct ConnectionWorker {
    context: Arc<ServerContext>,
    handle: WorkerHandle,
    stream: TcpStream,
}

enum Event {
    Stop,
    Outbound(ResponseData),
    Request(Result<Option<RequestData>, ReadError>),
}

impl ConnectionWorker {
    pub fn new(context: Arc<ServerContext>, handle: WorkerHandle, stream: TcpStream) -> Self {
        Self {
            context,
            handle,
            stream,
        }
    }

    pub async fn run(self) {
        let ConnectionWorker {
            context,
            mut handle,
            mut stream,
        } = self;
        let config = context.config();
        let mut reader = RequestReader::new(ReadLimits {
            max_payload: config.limits.max_payload_bytes,
            idle_timeout: config.limits.idle_timeout(),
        });

        tracing::debug!(connection_id = %handle.id, socket = %handle.socket, ip = %handle.ip, "Worker started");

        {
            let (mut rd, mut wr) = stream.split();
            loop {
                if *handle.stop.borrow() {
                    break;
                }
                let event = tokio::select! {
                    biased;
                    _ = handle.stop.changed() => Event::Stop,
                    Some(response) = handle.outbound.recv() => Event::Outbound(response),
                    result = reader.next_request(&mut rd) => Event::Request(result),
                };

                let keep_open = match event {
                    Event::Stop => false,
                    Event::Outbound(response) => {
                        write_response(&mut wr, &config, &response, false, false).await
                            && !response.force_close()
                    }
                    Event::Request(result) => {
                        handle_read(&context, &config, handle.ip, &handle.connection, &mut wr, result).await
                    }
                };
                if !keep_open {
                    break;
                }
            }
            let _ = wr.shutdown().await;
        }

        context.connections.deregister(handle.id);
        metrics::set_active_connections(context.connections.inbound_len());
        tracing::debug!(connection_id = %handle.id, ip = %handle.ip, "Worker finished");
    }
}

/// Act on one read result. Returns whether the connection stays open.
async fn handle_read<W>(
    context: &ServerContext,
    config: &ServerConfig,
    ip: IpAddr,
    connection: &Weak<Connection>,
    wr: &mut W,
    result: Result<Option<RequestData>, ReadError>,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let request = match result {
        Ok(Some(request)) => request,
        Ok(None) => return false,
        Err(ReadError::TooLarge) => {
            tracing::warn!(ip = %ip, limit = config.limits.max_payload_bytes, "Payload limit exceeded");
            if config.admission.ban_on_oversize {
                context.ban(ip, Some(config.admission.ban_duration()), "oversize");
            }
            let response = ResponseData::status(ResponseType::PayloadTooLarge).with_modifier(SendModifier::ForceClose);
            write_response(wr, config, &response, true, false).await;
            return false;
        }
        Err(ReadError::Parse(ParseError::Version(version))) => {
            tracing::debug!(ip = %ip, version = %version, "Unsupported HTTP version");
            let response =
                ResponseData::status(ResponseType::HttpVersionNotSupported).with_modifier(SendModifier::ForceClose);
            write_response(wr, config, &response, true, false).await;
            return false;
        }
        Err(ReadError::Parse(e)) => {
            tracing::debug!(ip = %ip, error = %e, "Malformed request");
            let response = ResponseData::status(ResponseType::BadRequest).with_modifier(SendModifier::ForceClose);
            write_response(wr, config, &response, true, false).await;
            return false;
        }
        Err(ReadError::Framing(e)) => {
            tracing::warn!(ip = %ip, error = %e, "Ambiguous request framing, closing");
            metrics::record_rejected("framing");
            return false;
        }
        Err(e) => {
            tracing::debug!(ip = %ip, error = %e, "Connection ended");
            return false;
        }
    };

    if let Some(connection) = connection.upgrade() {
        connection.record_request(&request);
    }

    let Some(response) = respond(context, config, ip, &request) else {
        return false;
    };
    let closing = request.wants_close();
    let head_only = request.method == "HEAD";
    write_response(wr, config, &response, closing, head_only).await && !closing && !response.force_close()
}

/// Build the response for a parsed request. `None` means close without one.
fn respond(
    context: &ServerContext,
    config: &ServerConfig,
    ip: IpAddr,
    request: &RequestData,
) -> Option<ResponseData> {
    // Blacklist first: scanners get no response, whatever Host they send.
    let verdict = context.filter.check(&request.target, &request.route);
    if let RouteVerdict::Blacklisted(keyword) = &verdict {
        tracing::warn!(ip = %ip, target = %request.target, keyword = %keyword, "Blacklisted request target");
        metrics::record_rejected("blacklist");
        if config.admission.ban_on_blacklist {
            context.ban(ip, Some(config.admission.ban_duration()), "blacklist");
        }
        return None;
    }

    let domains = &config.server.domains;
    if !domains.is_empty() && !domains.iter().any(|d| d.eq_ignore_ascii_case(request.host_name())) {
        tracing::debug!(ip = %ip, host = %request.host, "Host not served");
        return Some(ResponseData::status(ResponseType::BadRequest).with_modifier(SendModifier::ForceClose));
    }

    match verdict {
        RouteVerdict::Blacklisted(_) => None,
        RouteVerdict::NotFound => Some(ResponseData::status(ResponseType::NotFound)),
        RouteVerdict::Allowed => Some(handler::invoke(context.handler(), request)),
    }
}

/// Render and write. Returns false when the write failed.
async fn write_response<W>(
    wr: &mut W,
    config: &ServerConfig,
    response: &ResponseData,
    closing: bool,
    head_only: bool,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let options = RenderOptions {
        server_name: &config.server.name,
        closing,
    };
    let written = if head_only {
        write_head(wr, response, options).await
    } else {
        send_response(wr, response, options).await
    };

    match written {
        Ok(status) => {
            metrics::record_response(status.code().unwrap_or(500));
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "Response write failed");
            false
        }
    }
}

/// HEAD: the full head, no body.
async fn write_head<W>(
    wr: &mut W,
    response: &ResponseData,
    options: RenderOptions<'_>,
) -> std::io::Result<ResponseType>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = render(response, options);
    if let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") {
        bytes.truncate(end + 4);
    }
    wr.write_all(&bytes).await?;
    wr.flush().await?;
    Ok(response.effective_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::health::{HealthGate, Reachability};
    use crate::http::content_type::ContentType;
    use crate::http::handler::StatusPage;

    fn context(config: ServerConfig) -> ServerContext {
        let health = HealthGate::new(
            Reachability::new(Vec::new(), Duration::from_millis(10)),
            Duration::from_secs(5),
            false,
            None,
        );
        ServerContext::new(config, Arc::new(StatusPage::new("worker")), health)
    }

    fn get(target: &str, host: &str) -> RequestData {
        RequestData {
            method: "GET".into(),
            target: target.into(),
            route: target.into(),
            http_version: "HTTP/1.1".into(),
            host: host.into(),
            ..Default::default()
        }
    }

    #[test]
    fn blacklist_wins_over_foreign_host() {
        let mut config = ServerConfig::default();
        config.server.domains = vec!["example.com".into()];
        config.filter.blacklisted_keywords = vec![".php".into()];
        let ctx = context(config.clone());
        let peer: IpAddr = "192.0.2.30".parse().unwrap();

        assert!(respond(&ctx, &config, peer, &get("/wp-admin.php", "203.0.113.9")).is_none());

        let foreign = respond(&ctx, &config, peer, &get("/", "203.0.113.9")).unwrap();
        assert_eq!(foreign.response_type, ResponseType::BadRequest);
        assert!(foreign.force_close());

        let served = respond(&ctx, &config, peer, &get("/", "EXAMPLE.com:8080")).unwrap();
        assert_eq!(served.response_type, ResponseType::Ok);
    }

    #[tokio::test]
    async fn head_requests_get_no_body() {
        let config = ServerConfig::default();
        let response = ResponseData::ok(ContentType::Plain, "hello");

        let mut full = Vec::new();
        assert!(write_response(&mut full, &config, &response, false, false).await);
        assert!(String::from_utf8(full).unwrap().ends_with("\r\n\r\nhello"));

        let mut head = Vec::new();
        assert!(write_response(&mut head, &config, &response, false, true).await);
        let head = String::from_utf8(head).unwrap();
        assert!(head.contains("Content-Length: 5\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
