use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::server::ServerCore;

/// Bearer-token check against the live `admin.api_key`.
pub async fn admin_auth_middleware(
    State(core): State<Arc<ServerCore>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = core.context().config();

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if !config.admin.api_key.is_empty() && token == config.admin.api_key => {
            Ok(next.run(request).await)
        }
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
