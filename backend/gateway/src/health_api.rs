//! Gateway Health API

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::server::GatewayState;

/// Handler for `GET /status`
pub async fn get_status(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "linebridge",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "line": state.messaging.enabled(),
        "kommo": state.crm.is_some(),
        "pendingTasks": state.tasks.pending(),
    }))
}
