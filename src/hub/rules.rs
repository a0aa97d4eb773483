//! Rules endpoint

use super::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET /rules - Get all rules
pub async fn get_rules(State(state): State<AppState>) -> Json<Value> {
    let tunnel = state.tunnel();
    Json(json!({ "rules": tunnel.rules().rules() }))
}
