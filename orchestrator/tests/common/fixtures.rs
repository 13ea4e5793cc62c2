//! Test fixtures and data for orchestrator tests
//!
//! This module provides consistent test data and fixtures used across all test suites.

use std::time::Duration;

use orchestrator::BatchSettings;
use oximetry::{CleanedSeries, TARGET_SECONDS};
use shared::{PipelineConfig, Recording};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Standard batch coordinates
    pub const DATASET: &'static str = "shhs";
    pub const PREFIX: &'static str = "shhs1";
    pub const SUBPATH: &'static str = "polysomnography/edfs/shhs1";
    pub const CHANNEL: &'static str = "SaO2";

    /// Five hours, comfortably above the four-hour viability floor
    pub const VIABLE_SECONDS: usize = 5 * 3600;
    /// One hour, rejected by the cleaner
    pub const SHORT_SECONDS: usize = 3600;

    /// Panel width of the default engine plus the ODI column
    pub const FEATURE_COLUMNS: usize = 10;

    pub fn settings() -> BatchSettings {
        BatchSettings::new(Self::DATASET, Self::SUBPATH, Self::CHANNEL)
    }

    /// Fast retries and a short lock wait
    pub fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_token("test-token")
            .with_retry_base_delay(Duration::from_millis(1))
            .with_lock_timeout(Duration::from_secs(5))
    }

    pub fn recording(id: &str) -> Recording {
        Recording::new(Self::PREFIX, id).unwrap()
    }

    pub fn recordings(ids: &[&str]) -> Vec<Recording> {
        ids.iter().map(|id| Self::recording(id)).collect()
    }

    /// 1 Hz CSV recording at 97 % with one 30 s dip to 90 % in the middle
    pub fn raw_recording(seconds: usize) -> String {
        let dip = seconds / 2;
        let mut csv = String::with_capacity(seconds * 10);
        csv.push_str("time,SaO2\n");
        for t in 0..seconds {
            let value = if (dip..dip + 30).contains(&t) { 90 } else { 97 };
            csv.push_str(&format!("{t},{value}\n"));
        }
        csv
    }

    /// The same trace as `raw_recording`, as the archive serves it
    pub fn raw_edf(seconds: usize) -> Vec<u8> {
        let dip = seconds / 2;
        let values: Vec<i16> = (0..seconds)
            .map(|t| if (dip..dip + 30).contains(&t) { 90 } else { 97 })
            .collect();
        Self::edf(&values)
    }

    /// 4 h 20 min at 97 % with a 30 min sensor disconnect reading 0 %
    pub fn disconnected_edf() -> Vec<u8> {
        let mut values = vec![97i16; 4 * 3600 + 20 * 60];
        values[7000..8800].fill(0);
        Self::edf(&values)
    }

    /// Single-signal EDF at 1 Hz, one sample per one-second record, digital
    /// values equal to percent saturation
    pub fn edf(values: &[i16]) -> Vec<u8> {
        fn pad(out: &mut Vec<u8>, field: &str, width: usize) {
            out.extend(format!("{field:<width$}").bytes());
        }

        let mut out = Vec::with_capacity(512 + values.len() * 2);
        pad(&mut out, "0", 8);
        pad(&mut out, "X X X X", 80);
        pad(&mut out, "Startdate X X X X", 80);
        pad(&mut out, "01.01.01", 8);
        pad(&mut out, "00.00.00", 8);
        pad(&mut out, "512", 8);
        pad(&mut out, "", 44);
        pad(&mut out, &values.len().to_string(), 8);
        pad(&mut out, "1", 8);
        pad(&mut out, "1", 4);

        pad(&mut out, Self::CHANNEL, 16);
        pad(&mut out, "", 80);
        pad(&mut out, "%", 8);
        pad(&mut out, "0", 8);
        pad(&mut out, "100", 8);
        pad(&mut out, "0", 8);
        pad(&mut out, "100", 8);
        pad(&mut out, "", 80);
        pad(&mut out, "1", 8);
        pad(&mut out, "", 32);

        for value in values {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// A recording whose clock jumps by five seconds halfway through
    pub fn irregular_recording(seconds: usize) -> String {
        let mut csv = String::from("time,SaO2\n");
        for i in 0..seconds {
            let t = if i < seconds / 2 { i } else { i + 5 };
            csv.push_str(&format!("{t},97\n"));
        }
        csv
    }

    pub fn cleaned_series() -> CleanedSeries {
        CleanedSeries::from_values(vec![96.0; TARGET_SECONDS]).unwrap()
    }
}
