use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::net::connection::{ConnectionInfo, SocketId};
use crate::security::{parse_ip, BanInfo};
use crate::server::ServerCore;

/// Error body for rejected admin calls.
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": self.0 })),
        )
            .into_response()
    }
}

fn ip_arg(input: &str) -> Result<IpAddr, ApiError> {
    parse_ip(input).ok_or_else(|| ApiError(format!("'{input}' is not a valid IP address")))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub name: String,
    pub version: &'static str,
    pub initialized: bool,
    pub ready: bool,
    pub healthy: bool,
    pub tunnel_required: bool,
    pub listener_running: bool,
    pub local_addr: Option<String>,
    pub connections: usize,
    pub bans: usize,
    pub routes: usize,
    pub keywords: usize,
}

#[derive(Deserialize)]
pub struct BanRequest {
    pub ip: String,
    /// Omit for a permanent ban.
    pub minutes: Option<u64>,
}

#[derive(Deserialize)]
pub struct RouteRequest {
    pub route: String,
}

#[derive(Deserialize)]
pub struct KeywordRequest {
    pub keyword: String,
}

#[derive(Deserialize)]
pub struct DisconnectRequest {
    pub socket: Option<u64>,
    pub ip: Option<String>,
}

#[derive(Serialize)]
pub struct Changed {
    pub changed: bool,
}

#[derive(Serialize)]
pub struct Disconnected {
    pub disconnected: usize,
}

pub async fn get_status(State(core): State<Arc<ServerCore>>) -> Json<SystemStatus> {
    let context = core.context();
    Json(SystemStatus {
        name: core.name(),
        version: env!("CARGO_PKG_VERSION"),
        initialized: core.is_initialized(),
        ready: core.is_ready(),
        healthy: core.is_healthy().await,
        tunnel_required: core.is_tunnel_required(),
        listener_running: core.is_listener_running().await,
        local_addr: core.local_addr().await.map(|a| a.to_string()),
        connections: context.connections.len(),
        bans: context.bans.len(),
        routes: context.filter.routes().len(),
        keywords: context.filter.keywords().len(),
    })
}

pub async fn get_connections(State(core): State<Arc<ServerCore>>) -> Json<Vec<ConnectionInfo>> {
    Json(core.context().connections.snapshot())
}

pub async fn get_bans(State(core): State<Arc<ServerCore>>) -> Json<Vec<BanInfo>> {
    Json(core.context().bans.list())
}

pub async fn add_ban(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<BanRequest>,
) -> Result<Json<Disconnected>, ApiError> {
    let ip = ip_arg(&body.ip)?;
    let context = core.context();
    let before = context.connections.len();
    context.ban(ip, body.minutes.map(|m| Duration::from_secs(m.saturating_mul(60))), "manual");
    Ok(Json(Disconnected {
        disconnected: before.saturating_sub(context.connections.len()),
    }))
}

pub async fn remove_ban(
    State(core): State<Arc<ServerCore>>,
    Path(ip): Path<String>,
) -> Result<Json<Changed>, ApiError> {
    let ip = ip_arg(&ip)?;
    Ok(Json(Changed {
        changed: core.context().unban(ip),
    }))
}

pub async fn get_routes(State(core): State<Arc<ServerCore>>) -> Json<Vec<String>> {
    Json(core.context().filter.routes())
}

pub async fn add_route(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<RouteRequest>,
) -> Result<Json<Changed>, ApiError> {
    if !body.route.starts_with('/') {
        return Err(ApiError(format!("route '{}' must start with '/'", body.route)));
    }
    Ok(Json(Changed {
        changed: core.context().filter.add_route(&body.route),
    }))
}

pub async fn remove_route(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<RouteRequest>,
) -> Json<Changed> {
    Json(Changed {
        changed: core.context().filter.remove_route(&body.route),
    })
}

pub async fn clear_routes(State(core): State<Arc<ServerCore>>) -> Json<Changed> {
    core.context().clear_all_routes();
    Json(Changed { changed: true })
}

pub async fn get_keywords(State(core): State<Arc<ServerCore>>) -> Json<Vec<String>> {
    Json(core.context().filter.keywords())
}

pub async fn add_keyword(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<KeywordRequest>,
) -> Result<Json<Changed>, ApiError> {
    if body.keyword.is_empty() {
        return Err(ApiError("keyword must not be empty".to_string()));
    }
    Ok(Json(Changed {
        changed: core.context().filter.add_keyword(&body.keyword),
    }))
}

pub async fn remove_keyword(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<KeywordRequest>,
) -> Json<Changed> {
    Json(Changed {
        changed: core.context().filter.remove_keyword(&body.keyword),
    })
}

pub async fn disconnect(
    State(core): State<Arc<ServerCore>>,
    Json(body): Json<DisconnectRequest>,
) -> Result<Json<Disconnected>, ApiError> {
    let context = core.context();
    let disconnected = match (body.socket, body.ip.as_deref()) {
        (Some(socket), None) => usize::from(context.disconnect_socket(SocketId::from_raw(socket))),
        (None, Some(ip)) => context.disconnect_ip(ip_arg(ip)?),
        _ => return Err(ApiError("give exactly one of 'socket' or 'ip'".to_string())),
    };
    Ok(Json(Disconnected { disconnected }))
}

pub async fn clear_users(State(core): State<Arc<ServerCore>>) -> Json<Disconnected> {
    Json(Disconnected {
        disconnected: core.context().clear_all_users(),
    })
}
