//! Job submission: publish a request on its topic and track the experiment.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use ligandml_common::{JobKind, JobRequest};

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobBody {
    pub job_id: i64,
    pub experiment_id: i64,
    pub protein_data: Vec<f32>,
    pub target_value: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceJobBody {
    pub job_id: i64,
    pub experiment_id: i64,
    pub protein_data: Vec<f32>,
}

/// POST /jobs/train
pub async fn submit_train(
    State(state): State<SharedState>,
    Json(body): Json<TrainJobBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = JobRequest::Train {
        job_id: body.job_id,
        experiment_id: body.experiment_id,
        features: body.protein_data,
        target_value: body.target_value,
    };
    submit(&state, request).await
}

/// POST /jobs/inference
pub async fn submit_inference(
    State(state): State<SharedState>,
    Json(body): Json<InferenceJobBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = JobRequest::Inference {
        job_id: body.job_id,
        experiment_id: body.experiment_id,
        features: body.protein_data,
    };
    submit(&state, request).await
}

async fn submit(state: &SharedState, request: JobRequest) -> Result<(StatusCode, Json<Value>), ApiError> {
    let kind = request.kind();
    let label = match kind {
        JobKind::Train => "Model training",
        JobKind::Inference => "Model inference",
    };
    let producer = state
        .producer()
        .ok_or_else(|| ApiError::Unavailable("Broker not connected".to_string()))?;
    let payload = request
        .to_payload()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Recorded before publishing: the response may arrive before publish returns.
    let record = state.ledger.record_submitted(request.experiment_id(), request.job_id(), kind);

    if let Err(e) = producer.publish(kind.request_topic(), &payload).await {
        warn!(kind = %kind, experiment_id = record.experiment_id, error = %e, "Failed to publish request");
        state
            .ledger
            .record_failure(record.experiment_id, kind, format!("request not published: {e}"));
        return Ok((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "status": format!("{label} request failed: {e}") })),
        ));
    }

    info!(
        job_id = request.job_id(),
        experiment_id = record.experiment_id,
        kind = %kind,
        "Request submitted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "status": format!("{label} request sent") })),
    ))
}
