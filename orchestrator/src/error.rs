//! Orchestrator-specific error types
//!
//! `OrchestratorError` is fatal to a whole run. Everything else here is a
//! per-subject failure that the pipeline catches, classifies with a
//! `FailureKind` and records in the run summary.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use oximetry::SignalError;
use shared::{FailureKind, SharedError};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("File system operation failed: {operation} on {path}")]
    FileSystemError {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool unavailable: {reason}")]
    WorkerPoolError { reason: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("Artifact store error: {0}")]
    ArtifactError(#[from] ArtifactError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn file_system(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystemError {
            operation: operation.into(),
            path: path.into().display().to_string(),
            source,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Failure to download one recording
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transient fetch failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    #[error("Token not authorized for this file (HTTP {status})")]
    Authorization { status: u16 },

    #[error("No archive token configured")]
    MissingToken,

    #[error("Archive rejected the request (HTTP {status})")]
    Rejected { status: u16 },

    #[error("I/O error while writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Transient { .. } => FailureKind::TransientFetch,
            FetchError::Authorization { .. } | FetchError::MissingToken => FailureKind::Authorization,
            FetchError::Rejected { .. } => FailureKind::FetchRejected,
            FetchError::Io(_) => FailureKind::Io,
        }
    }
}

/// Failure to read a channel out of a recording container
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No SpO2 channel in {path}: looked for {requested} and known aliases, found [{available}]")]
    ChannelNotFound {
        path: PathBuf,
        requested: String,
        available: String,
    },

    #[error("Unsupported recording format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Malformed recording {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Invalid channel: {0}")]
    Signal(#[from] SignalError),

    #[error("I/O error reading recording: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Failure reading or writing a cached artifact
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Malformed artifact {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {format} artifact {path}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("Background task failed: {message}")]
    Task { message: String },
}

impl ArtifactError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ArtifactError::Malformed { .. } => FailureKind::MalformedArtifact,
            ArtifactError::LockTimeout { .. } => FailureKind::LockTimeout,
            ArtifactError::Io { .. } | ArtifactError::Task { .. } | ArtifactError::UnsupportedFormat { .. } => {
                FailureKind::Io
            }
        }
    }
}

/// Any failure inside one subject's pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Worker task failed: {message}")]
    Worker { message: String },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Fetch(e) => e.kind(),
            PipelineError::Source(SourceError::Signal(e)) | PipelineError::Signal(e) => signal_kind(e),
            PipelineError::Source(_) => FailureKind::SourceRead,
            PipelineError::Artifact(e) => e.kind(),
            PipelineError::Worker { .. } => FailureKind::WorkerPanicked,
        }
    }
}

fn signal_kind(error: &SignalError) -> FailureKind {
    match error {
        SignalError::IrregularSampling { .. } | SignalError::TooFewSamples { .. } => FailureKind::IrregularSampling,
        SignalError::NonIntegerRate { .. } | SignalError::InvalidRate { .. } => FailureKind::NonIntegerRate,
        SignalError::InsufficientData { .. } => FailureKind::InsufficientData,
        SignalError::EmptyChannel
        | SignalError::LengthMismatch { .. }
        | SignalError::NonFinite { .. }
        | SignalError::InvalidConfig { .. } => FailureKind::SourceRead,
    }
}
