//! Shared feature table with cross-process locking
//!
//! The table is a CSV file indexed by `nsrrid`. Every writer takes an
//! exclusive advisory lock on a `.lock` sidecar for the whole
//! load-upsert-persist cycle and replaces the table by atomic rename.

use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use shared::{FeatureVector, SubjectId};

use crate::error::ArtifactError;
use crate::services::artifact_store::commit_csv;

/// Index column of the feature table
pub const INDEX_COLUMN: &str = "nsrrid";

/// In-memory copy of the table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    /// Rows in file order, one per subject
    pub rows: Vec<(String, HashMap<String, f64>)>,
}

impl TableData {
    /// Replace the subject's row, moving it to the end, and widen the column set
    pub fn upsert(&mut self, subject: &str, features: &FeatureVector) {
        for name in features.names() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.rows.retain(|(id, _)| id != subject);
        let values = features.iter().map(|(n, v)| (n.to_string(), v)).collect();
        self.rows.push((subject.to_string(), values));
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.rows.iter().any(|(id, _)| id == subject)
    }

    pub fn get(&self, subject: &str, column: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|(id, _)| id == subject)
            .and_then(|(_, values)| values.get(column).copied())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Exclusive hold on the table's lock file, released on drop
struct TableLock {
    file: File,
}

impl Drop for TableLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl FeatureTable {
    pub fn new(path: PathBuf, lock_timeout: Duration, poll_interval: Duration) -> Self {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_timeout,
            poll_interval,
        }
    }

    /// `extracted_<columns>_features.csv` inside `dir`
    pub fn file_name(columns: usize) -> String {
        format!("extracted_{columns}_features.csv")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Insert or replace one subject's row under the table lock
    pub async fn upsert(&self, subject: &SubjectId, features: &FeatureVector) -> Result<(), ArtifactError> {
        let lock = self.acquire().await?;
        let path = self.path.clone();
        let subject = subject.to_string();
        let features = features.clone();

        tokio::task::spawn_blocking(move || {
            let _lock = lock;
            let mut table = load(&path)?;
            table.upsert(&subject, &features);
            persist(&path, &table)
        })
        .await
        .map_err(|e| ArtifactError::Task { message: e.to_string() })?
    }

    /// Whether the subject already has a row
    pub async fn contains(&self, subject: &SubjectId) -> Result<bool, ArtifactError> {
        let path = self.path.clone();
        let subject = subject.to_string();
        tokio::task::spawn_blocking(move || Ok(load(&path)?.contains(&subject)))
            .await
            .map_err(|e| ArtifactError::Task { message: e.to_string() })?
    }

    pub async fn read(&self) -> Result<TableData, ArtifactError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load(&path))
            .await
            .map_err(|e| ArtifactError::Task { message: e.to_string() })?
    }

    /// Poll for the exclusive lock until the timeout elapses
    async fn acquire(&self) -> Result<TableLock, ArtifactError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| ArtifactError::io(&self.lock_path, e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(TableLock { file }),
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(ArtifactError::io(&self.lock_path, e)),
            }

            let waited = started.elapsed();
            if waited >= self.lock_timeout {
                return Err(ArtifactError::LockTimeout {
                    path: self.lock_path.clone(),
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval.min(self.lock_timeout - waited)).await;
        }
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Read the table; a missing file is an empty table and repeated ids keep the last row
pub fn load(path: &Path) -> Result<TableData, ArtifactError> {
    if !path.exists() {
        return Ok(TableData::default());
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| ArtifactError::malformed(path, e))?;
    let headers = reader.headers().map_err(|e| ArtifactError::malformed(path, e))?.clone();
    if headers.get(0).map(str::trim) != Some(INDEX_COLUMN) {
        return Err(ArtifactError::malformed(path, format!("first column is not {INDEX_COLUMN}")));
    }

    let mut table = TableData {
        columns: headers.iter().skip(1).map(str::to_string).collect(),
        rows: Vec::new(),
    };

    for record in reader.records() {
        let record = record.map_err(|e| ArtifactError::malformed(path, e))?;
        let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) else {
            continue;
        };

        let mut values = HashMap::with_capacity(table.columns.len());
        for (column, raw) in table.columns.iter().zip(record.iter().skip(1)) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let value: f64 = raw
                .parse()
                .map_err(|_| ArtifactError::malformed(path, format!("bad value '{raw}' in column {column}")))?;
            values.insert(column.clone(), value);
        }

        table.rows.retain(|(existing, _)| existing != id);
        table.rows.push((id.to_string(), values));
    }

    Ok(table)
}

/// Write the table next to its final location, sync it and rename it into place
pub fn persist(path: &Path, table: &TableData) -> Result<(), ArtifactError> {
    commit_csv(path, |writer| {
        let mut header = Vec::with_capacity(table.columns.len() + 1);
        header.push(INDEX_COLUMN.to_string());
        header.extend(table.columns.iter().cloned());
        writer.write_record(&header)?;

        for (id, values) in &table.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(id.clone());
            for column in &table.columns {
                record.push(match values.get(column) {
                    Some(v) if !v.is_nan() => v.to_string(),
                    _ => String::new(),
                });
            }
            writer.write_record(&record)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::artifact_store::part_path;
    use std::fs;

    fn features(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_upsert_replaces_and_widens() {
        let mut table = TableData::default();
        table.upsert("1", &features(&[("AV", 95.0), ("ODI", 3.0)]));
        table.upsert("2", &features(&[("AV", 94.0)]));
        table.upsert("1", &features(&[("AV", 96.0), ("DI", 0.4)]));

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["AV", "ODI", "DI"]);
        assert_eq!(table.get("1", "AV"), Some(96.0));
        assert_eq!(table.get("1", "ODI"), None);
        assert_eq!(table.rows.last().unwrap().0, "1");
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FeatureTable::file_name(2));

        let mut table = TableData::default();
        table.upsert("200001", &features(&[("AV", 95.5), ("ODI", f64::NAN)]));
        persist(&path, &table).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.columns, vec!["AV", "ODI"]);
        assert_eq!(loaded.get("200001", "AV"), Some(95.5));
        assert_eq!(loaded.get("200001", "ODI"), None);
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_load_collapses_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "nsrrid,AV\n 7 ,90\n8,91\n7,92\n").unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("7", "AV"), Some(92.0));
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "id,AV\n1,2\n").unwrap();
        assert!(matches!(load(&path), Err(ArtifactError::Malformed { .. })));
    }
}
