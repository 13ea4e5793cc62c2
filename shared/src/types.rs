//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::{SharedError, SharedResult};

/// Identifier of one recorded subject; row key of the feature table
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> SharedResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\', ',']) {
            return Err(SharedError::InvalidSubjectId { input: id });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extract the trailing id from a recording name (`shhs1-200001.edf` -> `200001`)
    pub fn from_file_name(name: &str) -> SharedResult<Self> {
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let id = stem.rsplit('-').next().unwrap_or(stem);
        Self::new(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subject's recording as addressed on the archive and on disk
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recording {
    /// File stem shared by every artifact of this subject, e.g. `shhs1-200001`
    pub stem: String,
    pub subject: SubjectId,
}

impl Recording {
    pub fn new(prefix: &str, id: &str) -> SharedResult<Self> {
        let subject = SubjectId::new(id)?;
        Ok(Self {
            stem: format!("{}-{}", prefix, subject),
            subject,
        })
    }

    pub fn from_stem(stem: &str) -> SharedResult<Self> {
        Ok(Self {
            stem: stem.to_string(),
            subject: SubjectId::from_file_name(stem)?,
        })
    }
}

impl fmt::Display for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stem)
    }
}

/// Pipeline stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Fetch,
    Clean,
    Evict,
    Features,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Clean, Stage::Evict, Stage::Features];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Clean => "clean",
            Stage::Evict => "evict",
            Stage::Features => "features",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk byproducts whose existence marks a completed stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Raw,
    Cleaned,
    FeatureRow,
    /// Verdict that the recording holds too little usable signal
    SkipMarker,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Raw => write!(f, "raw"),
            ArtifactKind::Cleaned => write!(f, "cleaned"),
            ArtifactKind::FeatureRow => write!(f, "feature-row"),
            ArtifactKind::SkipMarker => write!(f, "skip-marker"),
        }
    }
}

/// Container format of a raw recording
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawFormat {
    #[default]
    Edf,
    Csv,
    Parquet,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RawFormat::Edf => "edf",
            RawFormat::Csv => "csv",
            RawFormat::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "edf" => Some(RawFormat::Edf),
            "csv" => Some(RawFormat::Csv),
            "parquet" => Some(RawFormat::Parquet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Why a subject's pipeline stopped short of a feature row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    TransientFetch,
    Authorization,
    FetchRejected,
    IrregularSampling,
    NonIntegerRate,
    InsufficientData,
    LockTimeout,
    MalformedArtifact,
    SourceRead,
    Io,
    WorkerPanicked,
}

impl FailureKind {
    /// Terminal outcomes that are recorded as "no result" rather than as errors
    pub fn is_skip(&self) -> bool {
        matches!(self, FailureKind::InsufficientData)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TransientFetch => "transient-fetch",
            FailureKind::Authorization => "authorization",
            FailureKind::FetchRejected => "fetch-rejected",
            FailureKind::IrregularSampling => "irregular-sampling",
            FailureKind::NonIntegerRate => "non-integer-rate",
            FailureKind::InsufficientData => "insufficient-data",
            FailureKind::LockTimeout => "lock-timeout",
            FailureKind::MalformedArtifact => "malformed-artifact",
            FailureKind::SourceRead => "source-read",
            FailureKind::Io => "io",
            FailureKind::WorkerPanicked => "worker-panicked",
        };
        f.write_str(name)
    }
}

/// Per-subject pipeline state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectState {
    Pending,
    Fetched,
    Cleaned,
    RawEvicted,
    Featured,
    Done,
    /// Cleaning found too little signal; nothing further runs
    Skipped,
    Failed(FailureKind),
}

impl SubjectState {
    /// The stage that moves a subject out of this state, if any
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            SubjectState::Pending => Some(Stage::Fetch),
            SubjectState::Fetched => Some(Stage::Clean),
            SubjectState::Cleaned => Some(Stage::Evict),
            SubjectState::RawEvicted => Some(Stage::Features),
            SubjectState::Featured | SubjectState::Done | SubjectState::Skipped | SubjectState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubjectState::Done | SubjectState::Skipped | SubjectState::Failed(_))
    }
}

impl fmt::Display for SubjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectState::Pending => write!(f, "PENDING"),
            SubjectState::Fetched => write!(f, "FETCHED"),
            SubjectState::Cleaned => write!(f, "CLEANED"),
            SubjectState::RawEvicted => write!(f, "RAW_EVICTED"),
            SubjectState::Featured => write!(f, "FEATURED"),
            SubjectState::Done => write!(f, "DONE"),
            SubjectState::Skipped => write!(f, "SKIPPED"),
            SubjectState::Failed(kind) => write!(f, "FAILED({kind})"),
        }
    }
}

/// One subject's feature row, in engine-defined column order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a feature, keeping first-insertion order
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn merge(&mut self, other: FeatureVector) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_from_file_name() {
        assert_eq!(SubjectId::from_file_name("shhs1-200001").unwrap().as_str(), "200001");
        assert_eq!(SubjectId::from_file_name("shhs1-200001.edf").unwrap().as_str(), "200001");
        assert_eq!(SubjectId::from_file_name("mesa-sleep-0042.csv").unwrap().as_str(), "0042");
        assert_eq!(SubjectId::from_file_name("plain").unwrap().as_str(), "plain");
    }

    #[test]
    fn test_subject_id_rejects_blank_and_separators() {
        assert!(SubjectId::new("   ").is_err());
        assert!(SubjectId::new("a/b").is_err());
        assert!(SubjectId::new("1,2").is_err());
        assert_eq!(SubjectId::new(" 17 ").unwrap().as_str(), "17");
    }

    #[test]
    fn test_raw_format_from_path() {
        assert_eq!(RawFormat::from_path(Path::new("a/shhs1-1.EDF")), Some(RawFormat::Edf));
        assert_eq!(RawFormat::from_path(Path::new("shhs1-1.parquet")), Some(RawFormat::Parquet));
        assert_eq!(RawFormat::from_path(Path::new("shhs1-1")), None);
    }

    #[test]
    fn test_recording_stem() {
        let recording = Recording::new("shhs1", "200077").unwrap();
        assert_eq!(recording.stem, "shhs1-200077");
        assert_eq!(recording.subject.as_str(), "200077");
        assert_eq!(Recording::from_stem("shhs1-200077").unwrap(), recording);
    }

    #[test]
    fn test_state_walks_stages_in_order() {
        let mut state = SubjectState::Pending;
        let mut seen = Vec::new();
        while let Some(stage) = state.next_stage() {
            seen.push(stage);
            state = match stage {
                Stage::Fetch => SubjectState::Fetched,
                Stage::Clean => SubjectState::Cleaned,
                Stage::Evict => SubjectState::RawEvicted,
                Stage::Features => SubjectState::Featured,
            };
        }
        assert_eq!(seen, Stage::ALL.to_vec());
        assert!(!SubjectState::Featured.is_terminal());
        assert!(SubjectState::Failed(FailureKind::Io).is_terminal());
        assert!(SubjectState::Skipped.is_terminal());
        assert_eq!(SubjectState::Skipped.next_stage(), None);
    }

    #[test]
    fn test_feature_vector_overwrites_in_place() {
        let mut features = FeatureVector::new();
        features.insert("AV", 95.0);
        features.insert("ODI", 4.0);
        features.insert("AV", 96.5);

        assert_eq!(features.len(), 2);
        assert_eq!(features.get("AV"), Some(96.5));
        assert_eq!(features.names().collect::<Vec<_>>(), vec!["AV", "ODI"]);
    }
}
