//! Trait definitions with mockall annotations for testing
//!
//! Every external capability the pipeline depends on sits behind one of these
//! traits. Each has exactly one production implementation in `services` and
//! a generated mock for tests.

use std::path::{Path, PathBuf};

use oximetry::{Channel, CleanedSeries};
use shared::{ArtifactKind, FeatureVector, PipelineConfig, Recording, SharedError, SubjectId};

use crate::error::{ArtifactError, FetchError, SourceError};

/// One recording to pull from the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub dataset: String,
    /// Archive sub-path, also used locally under the dataset directory
    pub subpath: String,
    /// File name including extension, e.g. `shhs1-200001.edf`
    pub file_name: String,
    /// Final on-disk location
    pub destination: PathBuf,
}

/// Retry-capable, partial-file-safe download of a named resource
#[mockall::automock]
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the resource to `request.destination`
    ///
    /// # Returns
    /// Number of bytes written. On any error no file is left at the
    /// destination or at its temporary sibling.
    async fn fetch(&self, request: &FetchRequest) -> Result<u64, FetchError>;
}

/// Reads a time-indexed channel out of a recording container
#[mockall::automock]
pub trait SignalSource: Send + Sync {
    /// Read the channel named `channel`, falling back to known SpO2 aliases
    fn read(&self, path: &Path, channel: &str) -> Result<Channel, SourceError>;
}

/// Computes a named biomarker panel from a cleaned series
#[mockall::automock]
pub trait BiomarkerEngine: Send + Sync {
    /// Column names produced by `compute`, in order
    fn feature_names(&self) -> Vec<String>;

    fn compute(&self, series: &CleanedSeries) -> FeatureVector;
}

/// Filesystem-backed cache of per-subject stage artifacts
///
/// Existence of an artifact is proof that the stage producing it completed.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create the output directories; failure is fatal to the run
    async fn prepare(&self) -> Result<(), ArtifactError>;

    /// Deterministic location of an artifact
    fn path(&self, kind: ArtifactKind, recording: &Recording) -> PathBuf;

    async fn exists(&self, kind: ArtifactKind, recording: &Recording) -> Result<bool, ArtifactError>;

    async fn write_cleaned(&self, recording: &Recording, series: &CleanedSeries) -> Result<(), ArtifactError>;

    /// Load a cleaned series; unparseable content is `ArtifactError::Malformed`
    async fn read_cleaned(&self, recording: &Recording) -> Result<CleanedSeries, ArtifactError>;

    /// Delete a cleaned series so it can be regenerated
    async fn discard_cleaned(&self, recording: &Recording) -> Result<(), ArtifactError>;

    /// Delete the raw recording
    ///
    /// # Returns
    /// `true` when a file was removed, `false` when it was already gone
    async fn evict_raw(&self, recording: &Recording) -> Result<bool, ArtifactError>;

    /// Record that the recording is unusable, with a human-readable reason
    async fn mark_skipped(&self, recording: &Recording, reason: &str) -> Result<(), ArtifactError>;

    /// Reason recorded by `mark_skipped`, if any
    async fn skip_reason(&self, recording: &Recording) -> Result<Option<String>, ArtifactError>;

    /// Insert or replace the subject's row in the shared feature table
    async fn upsert_features(&self, subject: &SubjectId, features: &FeatureVector) -> Result<(), ArtifactError>;
}

/// Source of run configuration
#[mockall::automock]
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<PipelineConfig, SharedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_biomarker_engine() {
        let mut engine = MockBiomarkerEngine::new();
        engine
            .expect_feature_names()
            .returning(|| vec!["AV".to_string()]);
        engine.expect_compute().returning(|series| {
            let mut features = FeatureVector::new();
            features.insert("AV", series.values()[0]);
            features
        });

        let series = CleanedSeries::from_values(vec![96.0; 10]).unwrap();
        assert_eq!(engine.feature_names(), vec!["AV".to_string()]);
        assert_eq!(engine.compute(&series).get("AV"), Some(96.0));
    }

    #[tokio::test]
    async fn test_mock_fetcher_error() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(FetchError::Authorization { status: 302 }));

        let request = FetchRequest {
            dataset: "shhs".to_string(),
            subpath: "polysomnography/edfs/shhs1".to_string(),
            file_name: "shhs1-200001.edf".to_string(),
            destination: PathBuf::from("/tmp/shhs1-200001.edf"),
        };
        let result = fetcher.fetch(&request).await;
        assert!(matches!(result, Err(FetchError::Authorization { status: 302 })));
    }
}
