//! Single-channel copies of EDF recordings
//!
//! The archive serves full polysomnography EDF files. Batches configured for
//! CSV or Parquet keep only a `time` column and the SpO2 channel, in the
//! layout `FileSignalSource` reads back.

use parquet::basic::{Repetition, Type as PhysicalType};
use parquet::data_type::DoubleType;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oximetry::Channel;
use shared::{logging, subject_debug, subject_warn, RawFormat, Stage, SubjectId};

use crate::error::{ArtifactError, OrchestratorResult, PipelineError};
use crate::report::find_files;
use crate::services::artifact_store::{commit_csv, part_path};
use crate::traits::SignalSource;

const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedRecording {
    pub input: PathBuf,
    pub output: PathBuf,
    pub samples: usize,
}

/// Write `time` and the channel to `path`; missing samples become empty cells
/// in CSV and nulls in Parquet
pub fn write_channel(channel: &Channel, format: RawFormat, path: &Path) -> Result<(), ArtifactError> {
    match format {
        RawFormat::Csv => write_csv(channel, path),
        RawFormat::Parquet => write_parquet(channel, path),
        RawFormat::Edf => Err(ArtifactError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: format.to_string(),
        }),
    }
}

/// Read the SpO2 channel out of `input` and write it to `output`
///
/// # Returns
/// Number of samples written
pub fn convert_recording<S: SignalSource>(
    source: &S,
    input: &Path,
    output: &Path,
    channel: &str,
) -> Result<usize, PipelineError> {
    let format = RawFormat::from_path(output).ok_or_else(|| ArtifactError::UnsupportedFormat {
        path: output.to_path_buf(),
        format: "unknown".to_string(),
    })?;
    let channel = source.read(input, channel)?;
    write_channel(&channel, format, output)?;
    Ok(channel.len())
}

/// Convert every EDF recording under `root` into `format` next to its source
///
/// Recordings that cannot be converted are logged and left in place. With
/// `remove_source` each EDF is deleted once its copy is written.
pub fn export_directory<S: SignalSource>(
    source: &S,
    root: &Path,
    format: RawFormat,
    channel: &str,
    remove_source: bool,
) -> OrchestratorResult<Vec<ExportedRecording>> {
    let inputs = find_files(root, |p| RawFormat::from_path(p) == Some(RawFormat::Edf))?;
    logging::log_progress("Export", &format!("{} EDF recording(s) under {} to {}", inputs.len(), root.display(), format));

    let mut exported = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = input.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let subject = SubjectId::from_file_name(name)?;
        let output = input.with_extension(format.extension());

        match convert_recording(source, &input, &output, channel) {
            Ok(samples) => {
                subject_debug!(subject, Stage::Fetch, "📦 {} → {} ({} samples)", input.display(), output.display(), samples);
                if remove_source {
                    if let Err(e) = fs::remove_file(&input) {
                        subject_warn!(subject, Stage::Fetch, "Could not remove {}: {}", input.display(), e);
                    }
                }
                exported.push(ExportedRecording { input, output, samples });
            }
            Err(e) => {
                let kind = e.kind();
                subject_warn!(subject, Stage::Fetch, kind = %kind, "⏭️ Not exported: {}", e);
            }
        }
    }
    Ok(exported)
}

fn write_csv(channel: &Channel, path: &Path) -> Result<(), ArtifactError> {
    commit_csv(path, |writer| {
        writer.write_record([TIME_COLUMN, channel.name()])?;
        for (time, value) in channel.timestamps().iter().zip(channel.values()) {
            let value = if value.is_nan() { String::new() } else { value.to_string() };
            writer.write_record([time.to_string(), value])?;
        }
        Ok(())
    })
}

fn write_parquet(channel: &Channel, path: &Path) -> Result<(), ArtifactError> {
    let tmp = part_path(path);
    let result = write_parquet_part(channel, &tmp).and_then(|()| fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn parquet_schema(value_column: &str) -> Result<Type, ParquetError> {
    let time = Type::primitive_type_builder(TIME_COLUMN, PhysicalType::DOUBLE)
        .with_repetition(Repetition::REQUIRED)
        .build()?;
    let value = Type::primitive_type_builder(value_column, PhysicalType::DOUBLE)
        .with_repetition(Repetition::OPTIONAL)
        .build()?;
    Type::group_type_builder("recording")
        .with_fields(vec![Arc::new(time), Arc::new(value)])
        .build()
}

fn write_parquet_part(channel: &Channel, tmp: &Path) -> Result<(), ArtifactError> {
    let malformed = |e: ParquetError| ArtifactError::malformed(tmp, e);

    let schema = Arc::new(parquet_schema(channel.name()).map_err(malformed)?);
    let file = File::create(tmp).map_err(|e| ArtifactError::io(tmp, e))?;
    let properties = Arc::new(WriterProperties::builder().build());
    let mut writer = SerializedFileWriter::new(file, schema, properties).map_err(malformed)?;

    // Nulls are encoded by definition level 0 and omitted from the values
    let levels: Vec<i16> = channel.values().iter().map(|v| i16::from(!v.is_nan())).collect();
    let present: Vec<f64> = channel.values().iter().copied().filter(|v| !v.is_nan()).collect();

    let mut row_group = writer.next_row_group().map_err(malformed)?;
    let mut index = 0;
    while let Some(mut column) = row_group.next_column().map_err(malformed)? {
        let typed = column.typed::<DoubleType>();
        let written = match index {
            0 => typed.write_batch(channel.timestamps(), None, None),
            _ => typed.write_batch(&present, Some(&levels), None),
        };
        written.map_err(malformed)?;
        column.close().map_err(malformed)?;
        index += 1;
    }
    row_group.close().map_err(malformed)?;

    let file = writer.into_inner().map_err(malformed)?;
    file.sync_all().map_err(|e| ArtifactError::io(tmp, e))
}
