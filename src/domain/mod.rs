//! Domain layer for Phylomatic
//!
//! This module contains the core models, errors and ports.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{PipelineError, PipelineResult, ProbeError};
