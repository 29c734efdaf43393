//! Authenticated administrative HTTP API.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::server::ServerCore;

#[allow(deprecated)]
pub fn setup_admin_router(core: Arc<ServerCore>) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/connections", get(get_connections))
        .route("/admin/bans", get(get_bans).post(add_ban))
        .route("/admin/bans/{ip}", delete(remove_ban))
        .route(
            "/admin/routes",
            get(get_routes).post(add_route).delete(remove_route),
        )
        .route("/admin/routes/clear", post(clear_routes))
        .route(
            "/admin/keywords",
            get(get_keywords).post(add_keyword).delete(remove_keyword),
        )
        .route("/admin/disconnect", post(disconnect))
        .route("/admin/users/clear", post(clear_users))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&core),
            admin_auth_middleware,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
        .with_state(core)
}

/// Serve the admin API on an already bound listener until `shutdown` fires.
pub async fn serve_on(
    listener: TcpListener,
    core: Arc<ServerCore>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let address = listener.local_addr()?;
    tracing::info!(address = %address, "Admin API listening");
    axum::serve(listener, setup_admin_router(core))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("Admin API stopped");
    Ok(())
}

pub async fn serve(
    address: &str,
    core: Arc<ServerCore>,
    shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    serve_on(listener, core, shutdown).await
}
