//! Application hook invoked for every admitted, allowed request.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::content_type::ContentType;
use super::request::RequestData;
use super::response::{ResponseData, ResponseType};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the response for a request that passed admission and filtering.
///
/// Runs on the connection's task; keep it short or move heavy work elsewhere.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: &RequestData) -> Result<ResponseData, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&RequestData) -> Result<ResponseData, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: &RequestData) -> Result<ResponseData, HandlerError> {
        self(request)
    }
}

/// Run a handler, mapping errors and panics to a failed-generation 500.
pub fn invoke(handler: &dyn RequestHandler, request: &RequestData) -> ResponseData {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(route = %request.route, error = %e, "Request handler failed");
            ResponseData::server_error().failed()
        }
        Err(_) => {
            tracing::error!(route = %request.route, "Request handler panicked");
            ResponseData::server_error().failed()
        }
    }
}

/// Default handler: a small status page naming the server.
#[derive(Debug, Clone)]
pub struct StatusPage {
    name: String,
}

impl StatusPage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RequestHandler for StatusPage {
    fn handle(&self, request: &RequestData) -> Result<ResponseData, HandlerError> {
        if !matches!(request.method.as_str(), "GET" | "HEAD") {
            return Ok(ResponseData::status(ResponseType::MethodNotAllowed));
        }
        let body = format!(
            "<!DOCTYPE html><html><head><title>{0}</title></head><body><h1>{0}</h1><p>{1}</p></body></html>",
            escape_html(&self.name),
            escape_html(&request.route)
        );
        Ok(ResponseData::ok(ContentType::Html, body))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
