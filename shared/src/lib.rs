//! Shared types for the SpO2 biomarker pipeline
//!
//! Contains the identifiers, stage vocabulary, feature rows and configuration
//! that both the signal crate and the orchestrator agree on, plus the tracing
//! setup used by every binary in the workspace.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{PipelineConfig, MAX_WORKERS};
pub use errors::*;
pub use types::*;
