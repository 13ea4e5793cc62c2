//! Deterministic SpO2 cleaning pipeline
//!
//! `SignalCleaner::clean` turns a raw channel at an integer sampling rate into
//! a 1 Hz series of exactly `TARGET_SECONDS` finite samples, or reports that
//! too little usable signal remains.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{Channel, SamplingRate};
use crate::error::{SignalError, SignalResult};
use crate::filters;
use crate::stats;

/// Seven hours at 1 Hz
pub const TARGET_SECONDS: usize = 7 * 60 * 60;
/// Four hours at 1 Hz
pub const MIN_VIABLE_SECONDS: usize = 4 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Seconds discarded at each end of the recording
    pub edge_trim_seconds: usize,
    pub range_min: f64,
    pub range_max: f64,
    /// Largest accepted sample-to-sample drop, in percent
    pub jump_threshold_pct: f64,
    /// Odd median filter length, in samples
    pub median_window: usize,
    /// Readings at or below this are treated as sensor disconnects
    pub block_threshold: f64,
    /// Disconnect runs longer than this many samples are removed
    pub block_run_length: usize,
    pub target_seconds: usize,
    pub min_viable_seconds: usize,
    /// Fill value when no valid sample survives
    pub fallback_fill: f64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            edge_trim_seconds: 5 * 60,
            range_min: 50.0,
            range_max: 100.0,
            jump_threshold_pct: 8.0,
            median_window: 9,
            block_threshold: 50.0,
            block_run_length: 0,
            target_seconds: TARGET_SECONDS,
            min_viable_seconds: MIN_VIABLE_SECONDS,
            fallback_fill: 98.0,
        }
    }
}

impl CleanerConfig {
    pub fn validate(&self) -> SignalResult<()> {
        if self.median_window == 0 || self.median_window % 2 == 0 {
            return Err(SignalError::InvalidConfig { field: "median_window" });
        }
        if !(self.range_min < self.range_max) {
            return Err(SignalError::InvalidConfig { field: "range_min" });
        }
        if !(self.jump_threshold_pct > 0.0) {
            return Err(SignalError::InvalidConfig {
                field: "jump_threshold_pct",
            });
        }
        if self.target_seconds == 0 || self.min_viable_seconds > self.target_seconds {
            return Err(SignalError::InvalidConfig { field: "target_seconds" });
        }
        if !self.fallback_fill.is_finite() {
            return Err(SignalError::InvalidConfig { field: "fallback_fill" });
        }
        Ok(())
    }
}

/// Fixed-length, gap-free 1 Hz series
#[derive(Clone, Debug, PartialEq)]
pub struct CleanedSeries {
    values: Vec<f64>,
}

impl CleanedSeries {
    /// Wrap already-cleaned values, e.g. ones read back from disk
    pub fn from_values(values: Vec<f64>) -> SignalResult<Self> {
        if values.is_empty() {
            return Err(SignalError::EmptyChannel);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(SignalError::NonFinite { index });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn duration_seconds(&self) -> usize {
        self.values.len()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignalCleaner {
    config: CleanerConfig,
}

impl SignalCleaner {
    pub fn new(config: CleanerConfig) -> SignalResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Clean a channel after validating its sampling regularity
    pub fn clean_channel(&self, channel: &Channel) -> SignalResult<CleanedSeries> {
        if channel.is_empty() {
            return Err(SignalError::EmptyChannel);
        }
        let rate = channel.sampling_rate()?;
        self.clean(channel.values(), rate)
    }

    /// Run the full pipeline over raw samples taken at `rate`
    pub fn clean(&self, samples: &[f64], rate: SamplingRate) -> SignalResult<CleanedSeries> {
        if samples.is_empty() {
            return Err(SignalError::EmptyChannel);
        }
        let cfg = &self.config;
        let hz = rate.hz() as usize;

        let mut signal = filters::trim_edges(samples, cfg.edge_trim_seconds * hz);
        if signal.is_empty() {
            return Err(SignalError::InsufficientData {
                step: "edge trim",
                seconds: 0,
                required: cfg.min_viable_seconds,
            });
        }
        debug!(samples = signal.len(), "edge trim");

        filters::clamp_range(&mut signal, cfg.range_min, cfg.range_max);
        debug!(missing = filters::count_missing(&signal), "range clamp");

        let signal = filters::delta_filter(&signal, cfg.jump_threshold_pct);
        debug!(samples = signal.len(), "delta filter");

        let mut signal = filters::median_smooth(&signal, cfg.median_window);
        filters::remove_blocks(&mut signal, cfg.block_threshold, cfg.block_run_length);
        debug!(missing = filters::count_missing(&signal), "block removal");

        let mut signal = filters::resample_mean(&signal, hz);
        let filled = filters::interpolate_gaps(&mut signal);
        debug!(samples = signal.len(), filled, "resampled to 1 Hz");

        if signal.len() < cfg.min_viable_seconds {
            return Err(SignalError::InsufficientData {
                step: "length normalisation",
                seconds: signal.len(),
                required: cfg.min_viable_seconds,
            });
        }

        let fill = stats::mean(&signal).unwrap_or(cfg.fallback_fill);
        for v in signal.iter_mut().filter(|v| !v.is_finite()) {
            *v = fill;
        }
        signal.truncate(cfg.target_seconds);
        signal.resize(cfg.target_seconds, fill);

        CleanedSeries::from_values(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(seconds: usize, hz: u32) -> Vec<f64> {
        (0..seconds * hz as usize)
            .map(|i| {
                let t = i as f64 / hz as f64;
                95.0 + 2.0 * (t / 600.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_length_invariant_across_rates() {
        let cleaner = SignalCleaner::default();
        for hz in [1, 10, 100] {
            let rate = SamplingRate::new(hz).unwrap();
            let series = cleaner.clean(&synthetic(4 * 3600 + 600, hz), rate).unwrap();
            assert_eq!(series.len(), TARGET_SECONDS, "rate {hz}");
            assert!(series.values().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_long_recording_truncated() {
        let cleaner = SignalCleaner::default();
        let series = cleaner.clean(&synthetic(9 * 3600, 1), SamplingRate::ONE_HZ).unwrap();
        assert_eq!(series.len(), TARGET_SECONDS);
    }

    #[test]
    fn test_short_recording_is_insufficient() {
        let cleaner = SignalCleaner::default();
        let result = cleaner.clean(&synthetic(3 * 3600 + 600, 1), SamplingRate::ONE_HZ);
        match result {
            Err(SignalError::InsufficientData { seconds, required, .. }) => {
                assert_eq!(seconds, 3 * 3600);
                assert_eq!(required, MIN_VIABLE_SECONDS);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn test_high_readings_clamped_not_dropped() {
        let mut samples = vec![97.0; 5 * 3600];
        samples[9000..10200].fill(101.0);
        let series = SignalCleaner::default().clean(&samples, SamplingRate::ONE_HZ).unwrap();
        assert_eq!(series.values()[9300], 100.0);
        assert_eq!(series.values()[100], 97.0);
    }

    #[test]
    fn test_disconnect_stretch_counts_against_viability() {
        // 4h20m recording, long enough before filtering
        let mut samples = vec![97.0; 4 * 3600 + 1200];
        samples[7000..8800].fill(0.0);
        let result = SignalCleaner::default().clean(&samples, SamplingRate::ONE_HZ);
        match result {
            Err(SignalError::InsufficientData { step, seconds, .. }) => {
                assert_eq!(step, "length normalisation");
                assert_eq!(seconds, 4 * 3600 + 1200 - 600 - 1800);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn test_edge_trim_emptying_series() {
        let cleaner = SignalCleaner::default();
        let result = cleaner.clean(&[97.0; 600], SamplingRate::ONE_HZ);
        assert!(matches!(
            result,
            Err(SignalError::InsufficientData { step: "edge trim", .. })
        ));
    }

    #[test]
    fn test_empty_channel_fails_fast() {
        let cleaner = SignalCleaner::default();
        assert_eq!(
            cleaner.clean(&[], SamplingRate::ONE_HZ),
            Err(SignalError::EmptyChannel)
        );
    }

    #[test]
    fn test_all_missing_falls_back() {
        let cleaner = SignalCleaner::default();
        // every value clamps to a disconnect reading and is blanked
        let series = cleaner.clean(&vec![20.0; 5 * 3600], SamplingRate::ONE_HZ).unwrap();
        assert_eq!(series.len(), TARGET_SECONDS);
        assert!(series.values().iter().all(|v| *v == 98.0));
    }

    #[test]
    fn test_padding_uses_series_mean() {
        let cleaner = SignalCleaner::default();
        let series = cleaner.clean(&vec![96.0; 5 * 3600], SamplingRate::ONE_HZ).unwrap();
        assert_eq!(series.values()[TARGET_SECONDS - 1], 96.0);
    }

    #[test]
    fn test_clean_channel_rejects_irregular_sampling() {
        let mut timestamps: Vec<f64> = (0..100).map(f64::from).collect();
        timestamps[40] = 40.5;
        let channel = Channel::new("SaO2", timestamps, vec![97.0; 100]).unwrap();
        assert!(matches!(
            SignalCleaner::default().clean_channel(&channel),
            Err(SignalError::IrregularSampling { .. })
        ));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: CleanerConfig = serde_json::from_str(r#"{"jump_threshold_pct": 4.0}"#).unwrap();
        assert_eq!(config.jump_threshold_pct, 4.0);
        assert_eq!(config.median_window, 9);
        assert!(SignalCleaner::new(config).is_ok());
    }

    #[test]
    fn test_even_median_window_rejected() {
        let config = CleanerConfig {
            median_window: 8,
            ..CleanerConfig::default()
        };
        assert_eq!(
            SignalCleaner::new(config).err(),
            Some(SignalError::InvalidConfig { field: "median_window" })
        );
    }

    #[test]
    fn test_cleaned_series_rejects_non_finite() {
        assert_eq!(
            CleanedSeries::from_values(vec![97.0, f64::NAN]),
            Err(SignalError::NonFinite { index: 1 })
        );
    }
}
