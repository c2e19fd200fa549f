//! ligandml-common — Shared types, errors, and wire messages used across all ligandml crates.

pub mod error;
pub mod ligand;
pub mod messages;

// Re-export commonly used types
pub use error::{LigandError, Result};
pub use messages::{
    JobKind, JobRequest, MalformedMessage, ModelResponse,
    TOPIC_INFERENCE_REQUEST, TOPIC_INFERENCE_RESPONSE, TOPIC_TRAIN_REQUEST, TOPIC_TRAIN_RESPONSE,
};
