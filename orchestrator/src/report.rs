//! Directory-wide desaturation report
//!
//! Walks a tree of CSV recordings, cleans each one and writes a two-column
//! table of per-subject desaturation indices. Runs sequentially; recordings
//! that cannot be cleaned are logged and left out of the table.

use std::fs;
use std::path::{Path, PathBuf};

use oximetry::{DesaturationCounter, SignalCleaner};
use shared::{logging, subject_debug, subject_warn, Stage, SubjectId};

use crate::error::{OrchestratorError, OrchestratorResult, PipelineError};
use crate::services::artifact_store::commit_csv;
use crate::services::feature_table::INDEX_COLUMN;
use crate::traits::SignalSource;

pub const ODI_REPORT_COLUMN: &str = "OxygenDesaturationIndex";

const CLEANED_SUFFIX: &str = "_cleaned";
const TABLE_PREFIX: &str = "extracted_";

#[derive(Debug, Clone, PartialEq)]
pub struct OdiRow {
    pub subject: SubjectId,
    pub odi: f64,
}

/// Recursively list raw CSV recordings under `root`, sorted by path
///
/// Cleaned series and feature tables produced by the pipeline are ignored.
pub fn find_recordings(root: &Path) -> OrchestratorResult<Vec<PathBuf>> {
    find_files(root, is_raw_csv)
}

/// Recursively list files under `root` accepted by `keep`, sorted by path
pub fn find_files(root: &Path, keep: impl Fn(&Path) -> bool) -> OrchestratorResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| OrchestratorError::file_system("read directory", &dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| OrchestratorError::file_system("read directory", &dir, e))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if keep(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_raw_csv(path: &Path) -> bool {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    is_csv && !stem.ends_with(CLEANED_SUFFIX) && !stem.starts_with(TABLE_PREFIX)
}

/// Clean and score every recording under `root`
pub fn desaturation_report<S: SignalSource>(
    source: &S,
    cleaner: &SignalCleaner,
    counter: &DesaturationCounter,
    root: &Path,
    channel: &str,
) -> OrchestratorResult<Vec<OdiRow>> {
    let recordings = find_recordings(root)?;
    logging::log_progress("ODI report", &format!("{} recording(s) under {}", recordings.len(), root.display()));

    let mut rows = Vec::with_capacity(recordings.len());
    for path in recordings {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let subject = SubjectId::from_file_name(name)?;

        match score(source, cleaner, counter, &path, channel) {
            Ok(odi) => {
                subject_debug!(subject, Stage::Features, "ODI {:.2}/h", odi);
                rows.push(OdiRow { subject, odi });
            }
            Err(e) => {
                let kind = e.kind();
                subject_warn!(subject, Stage::Clean, kind = %kind, "⏭️ Omitted from report: {}", e);
            }
        }
    }
    Ok(rows)
}

fn score<S: SignalSource>(
    source: &S,
    cleaner: &SignalCleaner,
    counter: &DesaturationCounter,
    path: &Path,
    channel: &str,
) -> Result<f64, PipelineError> {
    let channel = source.read(path, channel)?;
    let series = cleaner.clean_channel(&channel)?;
    Ok(counter.odi(&series))
}

/// Write `nsrrid,OxygenDesaturationIndex` rows, replacing any previous report
pub fn write_report(path: &Path, rows: &[OdiRow]) -> OrchestratorResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OrchestratorError::file_system("create report directory", parent, e))?;
    }

    commit_csv(path, |writer| {
        writer.write_record([INDEX_COLUMN, ODI_REPORT_COLUMN])?;
        for row in rows {
            let odi = if row.odi.is_finite() { row.odi.to_string() } else { String::new() };
            writer.write_record([row.subject.as_str(), odi.as_str()])?;
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::artifact_store::part_path;
    use crate::services::FileSignalSource;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_recording(path: &Path, seconds: usize, dip: Option<(usize, usize)>) {
        let mut file = fs::File::create(path).unwrap();
        writeln!(file, "time,SaO2").unwrap();
        for t in 0..seconds {
            let value = match dip {
                Some((start, len)) if t >= start && t < start + len => 90.0,
                _ => 97.0,
            };
            writeln!(file, "{t},{value}").unwrap();
        }
    }

    #[test]
    fn test_find_recordings_skips_pipeline_outputs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("a-1.csv"), "time,SaO2\n").unwrap();
        fs::write(nested.join("a-2.csv"), "time,SaO2\n").unwrap();
        fs::write(nested.join("a-2_cleaned.csv"), "time,SaO2\n").unwrap();
        fs::write(dir.path().join("extracted_10_features.csv"), "nsrrid\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let found = find_recordings(dir.path()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a-1.csv", "a-2.csv"]);
    }

    #[test]
    fn test_report_scores_and_omits_short_recordings() {
        let dir = TempDir::new().unwrap();
        // 5 h with one 30 s dip in the middle
        write_recording(&dir.path().join("mesa-0001.csv"), 18_000, Some((9_000, 30)));
        // 1 h is below the viable minimum
        write_recording(&dir.path().join("mesa-0002.csv"), 3_600, None);

        let rows = desaturation_report(
            &FileSignalSource::new(),
            &SignalCleaner::default(),
            &DesaturationCounter::default(),
            dir.path(),
            "SaO2",
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject.as_str(), "0001");
        // one event over the normalised seven hours
        assert!((rows[0].odi - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_report_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.csv");
        let rows = vec![
            OdiRow {
                subject: SubjectId::new("1").unwrap(),
                odi: 2.5,
            },
            OdiRow {
                subject: SubjectId::new("2").unwrap(),
                odi: f64::NAN,
            },
        ];

        write_report(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "nsrrid,OxygenDesaturationIndex\n1,2.5\n2,\n");
        assert!(!part_path(&path).exists());
    }
}
