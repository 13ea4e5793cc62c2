//! Filesystem artifact store
//!
//! Layout under `<root>/<dataset>/<subpath>/`:
//! - `<stem>.<raw-ext>` raw recording
//! - `<stem>_cleaned.csv` cleaned 1 Hz series (`time,SaO2`)
//! - `<stem>_skipped.txt` reason the recording was found unusable
//! - `extracted_<N>_features.csv` shared feature table and its `.lock`
//!
//! Files are written to a `.part` sibling and renamed into place, so an
//! artifact that exists is always complete.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;

use oximetry::{CleanedSeries, TARGET_SECONDS};
use shared::{subject_debug, ArtifactKind, FeatureVector, PipelineConfig, RawFormat, Recording, Stage, SubjectId};

use crate::error::ArtifactError;
use crate::services::feature_table::FeatureTable;
use crate::traits::ArtifactStore;

/// Column name of the value column in cleaned artifacts
pub const CLEANED_COLUMN: &str = "SaO2";

/// `<path>.part`
pub fn part_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Write a CSV file through its `.part` sibling, flush it to disk and rename
/// it into place. On failure the destination is untouched and the partial
/// file is removed.
pub fn commit_csv<F>(path: &Path, write: F) -> Result<(), ArtifactError>
where
    F: FnOnce(&mut csv::Writer<std::fs::File>) -> csv::Result<()>,
{
    let tmp = part_path(path);
    let result = write_part(&tmp, write).and_then(|()| std::fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Write `contents` through a synced `.part` sibling and rename it into place
pub fn commit_bytes(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    let tmp = part_path(path);
    let result = std::fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .map_err(|e| ArtifactError::io(&tmp, e))
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_part<F>(tmp: &Path, write: F) -> Result<(), ArtifactError>
where
    F: FnOnce(&mut csv::Writer<std::fs::File>) -> csv::Result<()>,
{
    let file = std::fs::File::create(tmp).map_err(|e| ArtifactError::io(tmp, e))?;
    let mut writer = csv::Writer::from_writer(file);
    write(&mut writer).map_err(|e| ArtifactError::malformed(tmp, e))?;
    let file = writer.into_inner().map_err(|e| ArtifactError::io(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| ArtifactError::io(tmp, e))
}

/// Real artifact store rooted at one dataset directory
pub struct FsArtifactStore {
    dir: PathBuf,
    raw_format: RawFormat,
    table: FeatureTable,
}

impl FsArtifactStore {
    /// Create a store for `<root>/<dataset>/<subpath>` whose table has
    /// `feature_columns` columns besides the index
    pub fn new(
        root: impl AsRef<Path>,
        dataset: &str,
        subpath: &str,
        raw_format: RawFormat,
        feature_columns: usize,
        config: &PipelineConfig,
    ) -> Self {
        let dir = root.as_ref().join(dataset).join(subpath);
        let table = FeatureTable::new(
            dir.join(FeatureTable::file_name(feature_columns)),
            config.lock_timeout,
            config.lock_poll_interval,
        );
        Self { dir, raw_format, table }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn raw_format(&self) -> RawFormat {
        self.raw_format
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    fn raw_path(&self, recording: &Recording) -> PathBuf {
        self.dir
            .join(format!("{}.{}", recording.stem, self.raw_format.extension()))
    }

    fn cleaned_path(&self, recording: &Recording) -> PathBuf {
        self.dir.join(format!("{}_cleaned.csv", recording.stem))
    }

    fn skip_path(&self, recording: &Recording) -> PathBuf {
        self.dir.join(format!("{}_skipped.txt", recording.stem))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn prepare(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArtifactError::io(&self.dir, e))
    }

    fn path(&self, kind: ArtifactKind, recording: &Recording) -> PathBuf {
        match kind {
            ArtifactKind::Raw => self.raw_path(recording),
            ArtifactKind::Cleaned => self.cleaned_path(recording),
            ArtifactKind::FeatureRow => self.table.path().to_path_buf(),
            ArtifactKind::SkipMarker => self.skip_path(recording),
        }
    }

    async fn exists(&self, kind: ArtifactKind, recording: &Recording) -> Result<bool, ArtifactError> {
        match kind {
            ArtifactKind::FeatureRow => self.table.contains(&recording.subject).await,
            _ => {
                let path = self.path(kind, recording);
                fs::try_exists(&path).await.map_err(|e| ArtifactError::io(path, e))
            }
        }
    }

    async fn write_cleaned(&self, recording: &Recording, series: &CleanedSeries) -> Result<(), ArtifactError> {
        let path = self.cleaned_path(recording);
        let values = series.values().to_vec();
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_series(&target, &values))
            .await
            .map_err(|e| ArtifactError::Task { message: e.to_string() })??;

        subject_debug!(recording.subject, Stage::Clean, "💾 Wrote {}", path.display());
        Ok(())
    }

    async fn read_cleaned(&self, recording: &Recording) -> Result<CleanedSeries, ArtifactError> {
        let path = self.cleaned_path(recording);
        tokio::task::spawn_blocking(move || read_series(&path))
            .await
            .map_err(|e| ArtifactError::Task { message: e.to_string() })?
    }

    async fn discard_cleaned(&self, recording: &Recording) -> Result<(), ArtifactError> {
        remove_if_present(&self.cleaned_path(recording)).await.map(|_| ())
    }

    async fn evict_raw(&self, recording: &Recording) -> Result<bool, ArtifactError> {
        remove_if_present(&self.raw_path(recording)).await
    }

    async fn mark_skipped(&self, recording: &Recording, reason: &str) -> Result<(), ArtifactError> {
        let path = self.skip_path(recording);
        let contents = format!("{}\n", reason.trim());
        tokio::task::spawn_blocking(move || commit_bytes(&path, contents.as_bytes()))
            .await
            .map_err(|e| ArtifactError::Task { message: e.to_string() })??;
        subject_debug!(recording.subject, Stage::Clean, "📝 Recorded skip");
        Ok(())
    }

    async fn skip_reason(&self, recording: &Recording) -> Result<Option<String>, ArtifactError> {
        let path = self.skip_path(recording);
        match fs::read_to_string(&path).await {
            Ok(reason) => Ok(Some(reason.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::io(path, e)),
        }
    }

    async fn upsert_features(&self, subject: &SubjectId, features: &FeatureVector) -> Result<(), ArtifactError> {
        self.table.upsert(subject, features).await
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, ArtifactError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArtifactError::io(path, e)),
    }
}

fn write_series(path: &Path, values: &[f64]) -> Result<(), ArtifactError> {
    commit_csv(path, |writer| {
        writer.write_record(["time", CLEANED_COLUMN])?;
        for (i, v) in values.iter().enumerate() {
            writer.write_record([i.to_string(), v.to_string()])?;
        }
        Ok(())
    })
}

fn read_series(path: &Path) -> Result<CleanedSeries, ArtifactError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| match e.kind() {
        csv::ErrorKind::Io(_) => ArtifactError::io(path, std::io::Error::new(ErrorKind::Other, e.to_string())),
        _ => ArtifactError::malformed(path, e),
    })?;
    let headers = reader.headers().map_err(|e| ArtifactError::malformed(path, e))?;
    let column = headers
        .iter()
        .position(|h| h.trim() == CLEANED_COLUMN)
        .ok_or_else(|| ArtifactError::malformed(path, format!("missing {CLEANED_COLUMN} column")))?;

    let mut values = Vec::with_capacity(TARGET_SECONDS);
    for record in reader.records() {
        let record = record.map_err(|e| ArtifactError::malformed(path, e))?;
        let raw = record
            .get(column)
            .ok_or_else(|| ArtifactError::malformed(path, "short row"))?;
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ArtifactError::malformed(path, format!("bad value '{raw}'")))?;
        values.push(value);
    }

    if values.len() != TARGET_SECONDS {
        return Err(ArtifactError::malformed(
            path,
            format!("{} samples, expected {}", values.len(), TARGET_SECONDS),
        ));
    }
    CleanedSeries::from_values(values).map_err(|e| ArtifactError::malformed(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/data/shhs1-1.edf")),
            PathBuf::from("/data/shhs1-1.edf.part")
        );
    }

    #[test]
    fn test_commit_csv_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        std::fs::write(&path, "previous\n").unwrap();

        commit_csv(&path, |w| w.write_record(["a", "b"])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_commit_csv_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        std::fs::write(&path, "previous\n").unwrap();

        let result = commit_csv(&path, |w| {
            w.write_record(["a", "b"])?;
            // ragged row
            w.write_record(["c"])
        });

        assert!(matches!(result, Err(ArtifactError::Malformed { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous\n");
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_paths_follow_layout() {
        let store = FsArtifactStore::new(
            "/data",
            "shhs",
            "polysomnography/edfs/shhs1",
            RawFormat::Edf,
            10,
            &PipelineConfig::default(),
        );
        let recording = Recording::new("shhs1", "200001").unwrap();
        let dir = PathBuf::from("/data/shhs/polysomnography/edfs/shhs1");

        assert_eq!(store.path(ArtifactKind::Raw, &recording), dir.join("shhs1-200001.edf"));
        assert_eq!(
            store.path(ArtifactKind::Cleaned, &recording),
            dir.join("shhs1-200001_cleaned.csv")
        );
        assert_eq!(
            store.path(ArtifactKind::FeatureRow, &recording),
            dir.join("extracted_10_features.csv")
        );
        assert_eq!(
            store.path(ArtifactKind::SkipMarker, &recording),
            dir.join("shhs1-200001_skipped.txt")
        );
        assert_eq!(
            store.table().lock_path(),
            dir.join("extracted_10_features.csv.lock").as_path()
        );
    }
}
