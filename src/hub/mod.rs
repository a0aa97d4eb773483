//! REST API Server (hub)
//!
//! External controller for inspecting rules and proxies, changing
//! Selector choices and reloading configuration at runtime.

mod auth;
mod common;
mod configs;
mod proxies;
mod rules;

pub use auth::auth_middleware;
pub use common::{ApiError, ApiResult};

use crate::tunnel::Tunnel;
use crate::{Core, Result, VERSION};

use axum::{
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// API secret for authentication
    pub secret: String,
    core: Arc<Core>,
}

impl AppState {
    pub fn new(secret: String, core: Arc<Core>) -> Self {
        AppState { secret, core }
    }

    /// Tunnel in effect right now
    pub fn tunnel(&self) -> Arc<Tunnel> {
        self.core.tunnel()
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }
}

/// Create the main router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(hello))
        .route("/version", get(version))
        .route("/proxies", get(proxies::get_proxies))
        .route(
            "/proxies/:name",
            get(proxies::get_proxy).put(proxies::update_proxy),
        )
        .route(
            "/configs",
            get(configs::get_configs)
                .put(configs::reload_configs)
                .patch(configs::patch_configs),
        )
        .route("/rules", get(rules::get_rules))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = create_router(state);
    info!("Starting REST API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn hello() -> Json<Value> {
    Json(json!({ "hello": "clash-route" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": VERSION }))
}
