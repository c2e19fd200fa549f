//! Axum router — maps all URL paths to handlers.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    experiments::{get_experiment, list_experiments},
    jobs::{submit_inference, submit_train},
    models::{cache_status, delete_weight, list_models, list_weights},
    system::{health, index, worker_status},
};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/",                    get(index))
        .route("/health",              get(health))
        .route("/worker-status",       get(worker_status))

        // Weights
        .route("/models",              get(list_models))
        .route("/weights",             get(list_weights))
        .route("/weights/{job_id}",    delete(delete_weight))
        .route("/weight-cache-status", get(cache_status))

        // Jobs
        .route("/jobs/train",          post(submit_train))
        .route("/jobs/inference",      post(submit_inference))
        .route("/experiments",         get(list_experiments))
        .route("/experiments/{id}",    get(get_experiment))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
