//! Orchestrator library for the SpO2 biomarker pipeline
//!
//! Downloads overnight oximetry recordings, cleans them into fixed-length
//! series, computes desaturation biomarkers and merges one row per subject
//! into a shared feature table. Every stage is cached on disk so that an
//! interrupted batch resumes where it stopped.

pub mod core;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use core::{OutcomeStatus, RunSummary, SkipReason, SubjectOutcome, SubjectSelection};
pub use error::{ArtifactError, FetchError, OrchestratorError, OrchestratorResult, PipelineError, SourceError};
pub use orchestrator::Orchestrator;
pub use pipeline::{BatchSettings, RunMode, ODI_COLUMN};
pub use traits::{ArtifactStore, BiomarkerEngine, ConfigSource, FetchRequest, Fetcher, SignalSource};
