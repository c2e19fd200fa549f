//! ligandml-web — HTTP surface for the model worker.
//! Provides:
//!   - Service banner and health
//!   - Worker and weight-cache status
//!   - Stored weight listing and removal
//!   - Job submission onto the broker and experiment tracking

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::{AppState, SharedState};
