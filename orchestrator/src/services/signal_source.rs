//! Reading SpO2 channels out of recording containers
//!
//! Supports EDF/EDF+ (the archive's native format) and the CSV and Parquet
//! exports with a `time` column plus one column per signal.

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use std::fs::File;
use std::path::Path;

use oximetry::Channel;
use shared::RawFormat;

use crate::error::SourceError;
use crate::traits::SignalSource;

/// Labels the oximetry channel carries across cohorts, in preference order
pub const CHANNEL_ALIASES: &[&str] = &["SaO2", "SpO2", "SPO2", "Sao2", "PulseOx", "OXI_SAT"];

const TIME_COLUMN: &str = "time";

/// Pick the requested channel, else the first known alias present
pub fn resolve_channel<'a>(available: &'a [String], requested: &str) -> Option<&'a str> {
    std::iter::once(requested)
        .chain(CHANNEL_ALIASES.iter().copied())
        .find_map(|name| available.iter().find(|a| a.trim() == name))
        .map(String::as_str)
}

fn not_found(path: &Path, requested: &str, available: &[String]) -> SourceError {
    SourceError::ChannelNotFound {
        path: path.to_path_buf(),
        requested: requested.to_string(),
        available: available.join(", "),
    }
}

/// Real signal source dispatching on file extension
#[derive(Debug, Default, Clone)]
pub struct FileSignalSource;

impl FileSignalSource {
    pub fn new() -> Self {
        Self
    }

    fn read_csv(&self, path: &Path, requested: &str) -> Result<Channel, SourceError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| SourceError::malformed(path, e))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SourceError::malformed(path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let time_idx = headers
            .iter()
            .position(|h| h == TIME_COLUMN)
            .ok_or_else(|| SourceError::malformed(path, "no time column"))?;
        let value_idx = resolve_channel(&headers, requested)
            .and_then(|name| headers.iter().position(|h| h == name))
            .ok_or_else(|| not_found(path, requested, &headers))?;
        let name = headers[value_idx].clone();

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| SourceError::malformed(path, e))?;
            let time = parse_cell(record.get(time_idx))
                .filter(|t| !t.is_nan())
                .ok_or_else(|| SourceError::malformed(path, format!("bad time at row {}", row + 1)))?;
            let value = parse_cell(record.get(value_idx))
                .ok_or_else(|| SourceError::malformed(path, format!("bad {name} at row {}", row + 1)))?;
            timestamps.push(time);
            values.push(value);
        }

        Ok(Channel::new(name, timestamps, values)?)
    }

    fn read_parquet(&self, path: &Path, requested: &str) -> Result<Channel, SourceError> {
        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file).map_err(|e| SourceError::malformed(path, e))?;

        let columns: Vec<String> = reader
            .metadata()
            .file_metadata()
            .schema()
            .get_fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        if !columns.iter().any(|c| c == TIME_COLUMN) {
            return Err(SourceError::malformed(path, "no time column"));
        }
        let name = resolve_channel(&columns, requested)
            .ok_or_else(|| not_found(path, requested, &columns))?
            .to_string();

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let rows = reader.get_row_iter(None).map_err(|e| SourceError::malformed(path, e))?;
        for (index, row) in rows.enumerate() {
            let row = row.map_err(|e| SourceError::malformed(path, e))?;
            let mut time = None;
            let mut value = None;
            for (column, field) in row.get_column_iter() {
                if column == TIME_COLUMN {
                    time = field_value(field);
                } else if *column == name {
                    value = field_value(field);
                }
            }
            match (time, value) {
                (Some(t), Some(v)) if !t.is_nan() => {
                    timestamps.push(t);
                    values.push(v);
                }
                _ => return Err(SourceError::malformed(path, format!("unreadable row {index}"))),
            }
        }

        Ok(Channel::new(name, timestamps, values)?)
    }

    fn read_edf(&self, path: &Path, requested: &str) -> Result<Channel, SourceError> {
        let bytes = std::fs::read(path)?;
        let header = edf::Header::parse(&bytes).map_err(|m| SourceError::malformed(path, m))?;

        let labels: Vec<String> = header.signals.iter().map(|s| s.label.clone()).collect();
        let index = resolve_channel(&labels, requested)
            .and_then(|name| labels.iter().position(|l| l == name))
            .ok_or_else(|| not_found(path, requested, &labels))?;
        let name = labels[index].clone();

        let (timestamps, values) = header
            .read_signal(&bytes, index)
            .map_err(|m| SourceError::malformed(path, m))?;
        Ok(Channel::new(name, timestamps, values)?)
    }
}

impl SignalSource for FileSignalSource {
    fn read(&self, path: &Path, channel: &str) -> Result<Channel, SourceError> {
        let format = RawFormat::from_path(path).ok_or_else(|| SourceError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;

        match format {
            RawFormat::Csv => self.read_csv(path, channel),
            RawFormat::Parquet => self.read_parquet(path, channel),
            RawFormat::Edf => self.read_edf(path, channel),
        }
    }
}

/// Empty cells are missing samples; anything else must parse
fn parse_cell(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cell.parse().ok()
}

fn field_value(field: &Field) -> Option<f64> {
    match field {
        Field::Null => Some(f64::NAN),
        Field::Double(v) => Some(*v),
        Field::Float(v) => Some(*v as f64),
        Field::Long(v) => Some(*v as f64),
        Field::Int(v) => Some(*v as f64),
        Field::Short(v) => Some(*v as f64),
        _ => None,
    }
}

/// Minimal EDF/EDF+ reader: fixed-width ASCII header, little-endian 16-bit
/// samples stored record by record.
pub mod edf {
    const FIXED_HEADER: usize = 256;
    const SIGNAL_HEADER: usize = 256;
    const ANNOTATIONS: &str = "EDF Annotations";

    #[derive(Debug, Clone, PartialEq)]
    pub struct SignalHeader {
        pub label: String,
        pub physical_min: f64,
        pub physical_max: f64,
        pub digital_min: f64,
        pub digital_max: f64,
        pub samples_per_record: usize,
    }

    impl SignalHeader {
        fn scale(&self, digital: i16) -> f64 {
            let span = self.digital_max - self.digital_min;
            if span == 0.0 {
                return digital as f64;
            }
            (digital as f64 - self.digital_min) * (self.physical_max - self.physical_min) / span + self.physical_min
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Header {
        pub header_bytes: usize,
        pub records: usize,
        pub record_duration: f64,
        pub signals: Vec<SignalHeader>,
    }

    fn field(bytes: &[u8], start: usize, len: usize) -> Result<&str, String> {
        let raw = bytes
            .get(start..start + len)
            .ok_or_else(|| "header truncated".to_string())?;
        std::str::from_utf8(raw)
            .map(str::trim)
            .map_err(|_| format!("non-ASCII header field at byte {start}"))
    }

    fn number<T: std::str::FromStr>(bytes: &[u8], start: usize, len: usize, what: &str) -> Result<T, String> {
        let text = field(bytes, start, len)?;
        text.parse().map_err(|_| format!("bad {what}: '{text}'"))
    }

    impl Header {
        pub fn parse(bytes: &[u8]) -> Result<Self, String> {
            if bytes.len() < FIXED_HEADER {
                return Err("file shorter than EDF header".to_string());
            }
            let header_bytes: usize = number(bytes, 184, 8, "header size")?;
            let declared_records: i64 = number(bytes, 236, 8, "record count")?;
            let record_duration: f64 = number(bytes, 244, 8, "record duration")?;
            let ns: usize = number(bytes, 252, 4, "signal count")?;
            if header_bytes != FIXED_HEADER + ns * SIGNAL_HEADER {
                return Err(format!("header size {header_bytes} does not match {ns} signals"));
            }

            // Per-signal fields are stored column-wise: all labels, then all transducers, ...
            let base = FIXED_HEADER;
            let offset = |block_start: usize, width: usize, i: usize| base + block_start * ns + i * width;
            let mut signals = Vec::with_capacity(ns);
            for i in 0..ns {
                signals.push(SignalHeader {
                    label: field(bytes, offset(0, 16, i), 16)?.to_string(),
                    physical_min: number(bytes, offset(16 + 80 + 8, 8, i), 8, "physical minimum")?,
                    physical_max: number(bytes, offset(16 + 80 + 16, 8, i), 8, "physical maximum")?,
                    digital_min: number(bytes, offset(16 + 80 + 24, 8, i), 8, "digital minimum")?,
                    digital_max: number(bytes, offset(16 + 80 + 32, 8, i), 8, "digital maximum")?,
                    samples_per_record: number(bytes, offset(16 + 80 + 40 + 80, 8, i), 8, "samples per record")?,
                });
            }

            let record_size: usize = signals.iter().map(|s| s.samples_per_record * 2).sum();
            if record_size == 0 {
                return Err("records carry no samples".to_string());
            }
            let available = (bytes.len() - header_bytes.min(bytes.len())) / record_size;
            let records = if declared_records < 0 {
                available
            } else {
                (declared_records as usize).min(available)
            };

            Ok(Self {
                header_bytes,
                records,
                record_duration,
                signals,
            })
        }

        /// Physical samples of one signal with their timestamps in seconds
        pub fn read_signal(&self, bytes: &[u8], index: usize) -> Result<(Vec<f64>, Vec<f64>), String> {
            let signal = self
                .signals
                .get(index)
                .ok_or_else(|| format!("no signal {index}"))?;
            if signal.label == ANNOTATIONS {
                return Err("annotation channel has no samples".to_string());
            }
            if !(self.record_duration > 0.0) {
                return Err(format!("record duration {} is not positive", self.record_duration));
            }

            let record_size: usize = self.signals.iter().map(|s| s.samples_per_record * 2).sum();
            let skip: usize = self.signals[..index].iter().map(|s| s.samples_per_record * 2).sum();
            let n = signal.samples_per_record;
            let step = self.record_duration / n as f64;

            let mut timestamps = Vec::with_capacity(self.records * n);
            let mut values = Vec::with_capacity(self.records * n);
            for record in 0..self.records {
                let start = self.header_bytes + record * record_size + skip;
                let chunk = bytes
                    .get(start..start + n * 2)
                    .ok_or_else(|| format!("record {record} truncated"))?;
                for (k, pair) in chunk.chunks_exact(2).enumerate() {
                    let digital = i16::from_le_bytes([pair[0], pair[1]]);
                    timestamps.push((record * n + k) as f64 * step);
                    values.push(signal.scale(digital));
                }
            }
            Ok((timestamps, values))
        }
    }
}
