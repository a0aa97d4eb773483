//! Configs endpoints
//!
//! Current settings, hot reload and mode switching.

use super::common::{ApiError, ApiResult, ConfigPatch, ConfigReload};
use super::AppState;
use crate::config::Config;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

/// GET /configs - Get current configuration
pub async fn get_configs(State(state): State<AppState>) -> Json<Value> {
    let config = state.core().config().await;

    Json(json!({
        "mode": config.mode.as_deref().unwrap_or("rule"),
        "log-level": config.log_level.as_deref().unwrap_or("info"),
        "geosite-database": state.core().geosite_database().display().to_string(),
    }))
}

/// PUT /configs - Reload configuration from file or payload
///
/// Rebuilds rules, proxies and groups and drops cached GeoSite data.
pub async fn reload_configs(
    State(state): State<AppState>,
    Json(body): Json<ConfigReload>,
) -> ApiResult<StatusCode> {
    info!("Reloading configuration");

    let config = if let Some(path) = body.path {
        let path = PathBuf::from(path);
        let path = match state.core().home_dir() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        };
        debug!("Loading config from path: {}", path.display());
        Config::load(&path)
            .map_err(|e| ApiError::bad_request(format!("Failed to load config: {}", e)))?
    } else if let Some(payload) = body.payload {
        debug!("Loading config from payload");
        Config::from_str(&payload)
            .map_err(|e| ApiError::bad_request(format!("Failed to parse config: {}", e)))?
    } else {
        return Err(ApiError::bad_request("Either path or payload must be provided"));
    };

    state
        .core()
        .reload(config)
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to apply config: {}", e)))?;

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /configs - Partial update of runtime settings
pub async fn patch_configs(
    State(state): State<AppState>,
    Json(patch): Json<ConfigPatch>,
) -> ApiResult<StatusCode> {
    if let Some(mode) = patch.mode {
        debug!("Setting mode to: {}", mode);
        state
            .core()
            .set_mode(&mode)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    info!("Configuration patched");
    Ok(StatusCode::NO_CONTENT)
}
