use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /experiments
pub async fn list_experiments(State(state): State<SharedState>) -> Json<Value> {
    Json(json!(state.ledger.all()))
}

/// GET /experiments/{id}
pub async fn get_experiment(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state
        .ledger
        .get(id)
        .map(|record| Json(json!(record)))
        .ok_or_else(|| ApiError::NotFound(format!("Experiment {id} not found")))
}
