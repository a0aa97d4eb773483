//! Proxies endpoints
//!
//! Proxy listing and Selector choice.

use super::common::{ApiError, ApiResult, UpdateProxyRequest};
use super::AppState;
use crate::outbound::OutboundProxy;
use crate::tunnel::Tunnel;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// GET /proxies - Get all proxies
pub async fn get_proxies(State(state): State<AppState>) -> Json<Value> {
    let tunnel = state.tunnel();
    let proxies: serde_json::Map<String, Value> = tunnel
        .proxies()
        .iter()
        .map(|(name, proxy)| (name.clone(), proxy_json(&tunnel, proxy)))
        .collect();
    Json(json!({ "proxies": proxies }))
}

/// GET /proxies/:name - Get a specific proxy
pub async fn get_proxy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let tunnel = state.tunnel();
    match tunnel.proxies().get(&name) {
        Some(proxy) => Ok(Json(proxy_json(&tunnel, proxy))),
        None => Err(ApiError::not_found("Proxy")),
    }
}

/// PUT /proxies/:name - Update proxy selection (for groups)
pub async fn update_proxy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<UpdateProxyRequest>,
) -> ApiResult<StatusCode> {
    debug!("Update proxy {} to select {}", name, body.name);

    let tunnel = state.tunnel();
    if !tunnel.proxies().contains(&name) {
        return Err(ApiError::not_found("Proxy"));
    }
    let Some(group) = tunnel.group(&name) else {
        return Err(ApiError::bad_request("Must be a Selector proxy group"));
    };

    group
        .set(&body.name)
        .map_err(|e| ApiError::bad_request(format!("Selector update error: {}", e)))?;
    Ok(StatusCode::NO_CONTENT)
}

fn proxy_json(tunnel: &Tunnel, proxy: &Arc<dyn OutboundProxy>) -> Value {
    let mut value = json!({
        "name": proxy.name(),
        "type": proxy.proxy_type().to_string(),
        "udp": proxy.support_udp(),
        "alive": proxy.alive(),
        "delay": proxy.last_delay().as_millis() as u64,
        "history": [],
    });

    if let Some(group) = tunnel.group(proxy.name()) {
        let snapshot = group.describe();
        value["now"] = json!(snapshot.now);
        value["all"] = json!(snapshot.all);
    }
    value
}
