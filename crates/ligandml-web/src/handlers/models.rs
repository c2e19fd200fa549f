//! Weight files and the in-memory weight cache.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /models - cached model parameters
pub async fn list_models(State(state): State<SharedState>) -> Json<Value> {
    Json(json!(state.store.cache().models()))
}

/// GET /weights - job ids with a weight file
pub async fn list_weights(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let store = Arc::clone(&state.store);
    let jobs = tokio::task::spawn_blocking(move || store.stored_jobs()).await??;
    Ok(Json(json!(jobs)))
}

/// DELETE /weights/{job_id}
pub async fn delete_weight(
    State(state): State<SharedState>,
    Path(job_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    // Removal waits on the store lock, which training holds across a step.
    let store = Arc::clone(&state.store);
    let removed = tokio::task::spawn_blocking(move || store.remove(job_id)).await??;
    if !removed {
        return Err(ApiError::NotFound(format!("No weights stored for job {job_id}")));
    }
    info!(job_id, "Weights removed");
    Ok(Json(json!({ "success": true, "job_id": job_id })))
}

/// GET /weight-cache-status
pub async fn cache_status(State(state): State<SharedState>) -> Json<Value> {
    let cache = state.store.cache();
    Json(json!({
        "enabled": cache.is_enabled(),
        "capacity": cache.capacity(),
        "size": cache.len(),
        "entries": cache.entries(),
    }))
}
