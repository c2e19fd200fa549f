//! Model error types.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid feature dimension: expected {expected}, got {actual}")]
    InvalidFeatureDimension { expected: usize, actual: usize },

    #[error("Base weights not found at {0}")]
    MissingBaseWeights(PathBuf),
}
