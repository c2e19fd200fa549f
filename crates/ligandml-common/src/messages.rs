//! Broker wire messages: train/inference requests and their responses.
//!
//! Requests arrive as JSON objects on [`TOPIC_TRAIN_REQUEST`] or
//! [`TOPIC_INFERENCE_REQUEST`]:
//!
//! ```json
//! {"job_id": 7, "experiment_id": 42, "protein_data": [0.1, 0.2], "target_value": 5.1}
//! ```
//!
//! Responses go back on the matching `*Response` topic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOPIC_TRAIN_REQUEST: &str = "ModelTrainRequest";
pub const TOPIC_INFERENCE_REQUEST: &str = "ModelInferenceRequest";
pub const TOPIC_TRAIN_RESPONSE: &str = "ModelTrainResponse";
pub const TOPIC_INFERENCE_RESPONSE: &str = "ModelInferenceResponse";

/// The two kinds of job the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Train,
    Inference,
}

impl JobKind {
    pub fn from_request_topic(topic: &str) -> Option<Self> {
        match topic {
            TOPIC_TRAIN_REQUEST => Some(Self::Train),
            TOPIC_INFERENCE_REQUEST => Some(Self::Inference),
            _ => None,
        }
    }

    pub fn from_response_topic(topic: &str) -> Option<Self> {
        match topic {
            TOPIC_TRAIN_RESPONSE => Some(Self::Train),
            TOPIC_INFERENCE_RESPONSE => Some(Self::Inference),
            _ => None,
        }
    }

    pub fn request_topic(self) -> &'static str {
        match self {
            Self::Train => TOPIC_TRAIN_REQUEST,
            Self::Inference => TOPIC_INFERENCE_REQUEST,
        }
    }

    pub fn response_topic(self) -> &'static str {
        match self {
            Self::Train => TOPIC_TRAIN_RESPONSE,
            Self::Inference => TOPIC_INFERENCE_RESPONSE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Inference => "inference",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an incoming message was rejected. Rejected messages are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// A validated request taken off one of the request topics.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Train {
        job_id: i64,
        experiment_id: i64,
        features: Vec<f32>,
        target_value: f32,
    },
    Inference {
        job_id: i64,
        experiment_id: i64,
        features: Vec<f32>,
    },
}

/// Wire shape shared by both request kinds. Every field is optional so that
/// absence can be reported by name instead of as a serde error.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    experiment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protein_data: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_value: Option<f32>,
}

impl JobRequest {
    /// Validate a raw broker message.
    pub fn parse(topic: &str, payload: &[u8]) -> Result<Self, MalformedMessage> {
        let kind = JobKind::from_request_topic(topic)
            .ok_or_else(|| MalformedMessage::UnknownTopic(topic.to_string()))?;

        let raw: RawRequest = serde_json::from_slice(payload)
            .map_err(|e| MalformedMessage::InvalidPayload(e.to_string()))?;

        let job_id = raw.job_id.ok_or(MalformedMessage::MissingField("job_id"))?;
        let experiment_id = raw
            .experiment_id
            .ok_or(MalformedMessage::MissingField("experiment_id"))?;
        let features = raw
            .protein_data
            .ok_or(MalformedMessage::MissingField("protein_data"))?;

        match kind {
            JobKind::Train => {
                let target_value = raw
                    .target_value
                    .ok_or(MalformedMessage::MissingField("target_value"))?;
                Ok(Self::Train { job_id, experiment_id, features, target_value })
            }
            JobKind::Inference => Ok(Self::Inference { job_id, experiment_id, features }),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Train { .. } => JobKind::Train,
            Self::Inference { .. } => JobKind::Inference,
        }
    }

    pub fn job_id(&self) -> i64 {
        match self {
            Self::Train { job_id, .. } | Self::Inference { job_id, .. } => *job_id,
        }
    }

    pub fn experiment_id(&self) -> i64 {
        match self {
            Self::Train { experiment_id, .. } | Self::Inference { experiment_id, .. } => *experiment_id,
        }
    }

    pub fn features(&self) -> &[f32] {
        match self {
            Self::Train { features, .. } | Self::Inference { features, .. } => features,
        }
    }

    /// Encode for publishing on [`JobKind::request_topic`].
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        let raw = match self {
            Self::Train { job_id, experiment_id, features, target_value } => RawRequest {
                job_id: Some(*job_id),
                experiment_id: Some(*experiment_id),
                protein_data: Some(features.clone()),
                target_value: Some(*target_value),
            },
            Self::Inference { job_id, experiment_id, features } => RawRequest {
                job_id: Some(*job_id),
                experiment_id: Some(*experiment_id),
                protein_data: Some(features.clone()),
                target_value: None,
            },
        };
        serde_json::to_vec(&raw)
    }
}

/// Result message emitted on a response topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub success: bool,
    pub experiment_id: i64,
    pub result: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn ok(experiment_id: i64, result: f64) -> Self {
        Self { success: true, experiment_id, result: Some(result), error: None }
    }

    pub fn failed(experiment_id: i64, error: impl Into<String>) -> Self {
        Self { success: false, experiment_id, result: None, error: Some(error.into()) }
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
