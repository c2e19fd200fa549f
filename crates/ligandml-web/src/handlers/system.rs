//! Banner, health, and worker status.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::SharedState;

pub const BANNER: &str = "Hello, this is the ligandml ML Server";

/// GET /
pub async fn index() -> &'static str {
    BANNER
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "broker_connected": state.producer.initialized(),
    }))
}

/// GET /worker-status
pub async fn worker_status(State(state): State<SharedState>) -> Json<Value> {
    Json(json!(state.status.snapshot()))
}
