//! Time-indexed physiological channel and sampling-rate validation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SignalError, SignalResult};

/// Relative tolerance when comparing sampling intervals
const INTERVAL_RTOL: f64 = 1e-5;
/// Absolute tolerance when comparing sampling intervals
const INTERVAL_ATOL: f64 = 1e-8;
/// How far `1/interval` may sit from an integer before the rate is rejected
const RATE_TOL: f64 = 1e-6;

/// One physiological signal as read from a recording
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, timestamps: Vec<f64>, values: Vec<f64>) -> SignalResult<Self> {
        if timestamps.len() != values.len() {
            return Err(SignalError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            timestamps,
            values,
        })
    }

    /// Build a channel with timestamps `i / rate`
    pub fn from_rate(name: impl Into<String>, values: Vec<f64>, rate: SamplingRate) -> Self {
        let hz = rate.hz() as f64;
        let timestamps = (0..values.len()).map(|i| i as f64 / hz).collect();
        Self {
            name: name.into(),
            timestamps,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
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

    /// Derive the sampling rate, rejecting irregular or fractional rates
    pub fn sampling_rate(&self) -> SignalResult<SamplingRate> {
        SamplingRate::detect(&self.timestamps)
    }
}

/// Positive integer sampling rate in Hz
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplingRate(u32);

impl SamplingRate {
    pub const ONE_HZ: SamplingRate = SamplingRate(1);

    pub fn new(hz: u32) -> SignalResult<Self> {
        if hz == 0 {
            return Err(SignalError::InvalidRate { hz });
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }

    /// Check that every interval matches the first one and that the implied
    /// rate is a whole number of samples per second.
    pub fn detect(timestamps: &[f64]) -> SignalResult<Self> {
        if timestamps.len() < 2 {
            return Err(SignalError::TooFewSamples {
                samples: timestamps.len(),
            });
        }

        let expected = timestamps[1] - timestamps[0];
        if !expected.is_finite() || expected <= 0.0 {
            return Err(SignalError::IrregularSampling {
                index: 1,
                expected,
                found: expected,
            });
        }

        for (index, pair) in timestamps.windows(2).enumerate().skip(1) {
            let found = pair[1] - pair[0];
            if !found.is_finite() || (found - expected).abs() > INTERVAL_ATOL + INTERVAL_RTOL * expected.abs() {
                return Err(SignalError::IrregularSampling {
                    index: index + 1,
                    expected,
                    found,
                });
            }
        }

        let implied = 1.0 / expected;
        let rounded = implied.round();
        if rounded < 1.0 || (implied - rounded).abs() > RATE_TOL * rounded {
            return Err(SignalError::NonIntegerRate { rate: implied });
        }

        Ok(Self(rounded as u32))
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}
