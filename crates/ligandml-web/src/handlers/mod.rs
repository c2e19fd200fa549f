//! HTTP handlers for all routes.

pub mod experiments;
pub mod jobs;
pub mod models;
pub mod system;
