//! Signal processing error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Channel is empty")]
    EmptyChannel,

    #[error("Channel has {timestamps} timestamps but {values} values")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("Need at least two samples to derive a sampling rate, got {samples}")]
    TooFewSamples { samples: usize },

    #[error("Irregular sampling at sample {index}: interval {found}s, expected {expected}s")]
    IrregularSampling { index: usize, expected: f64, found: f64 },

    #[error("Implied sampling rate {rate} Hz is not an integer")]
    NonIntegerRate { rate: f64 },

    #[error("Invalid sampling rate: {hz} Hz")]
    InvalidRate { hz: u32 },

    #[error("Insufficient data after {step}: {seconds}s available, {required}s required")]
    InsufficientData {
        step: &'static str,
        seconds: usize,
        required: usize,
    },

    #[error("Non-finite value at sample {index}")]
    NonFinite { index: usize },

    #[error("Invalid cleaner configuration: {field}")]
    InvalidConfig { field: &'static str },
}

pub type SignalResult<T> = Result<T, SignalError>;
