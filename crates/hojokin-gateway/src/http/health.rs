use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.hub.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": hojokin_core::config::PROTOCOL_VERSION,
        "connections": stats.connections,
        "rooms": stats.rooms,
        "locks": stats.locks,
        "queue": state.hub.queue_backend(),
        "provider": state.drafts.provider_name(),
    }))
}
