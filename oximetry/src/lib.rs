//! Pure SpO2 signal processing
//!
//! Turns a raw, variable-rate oximetry channel into a fixed-length, gap-free
//! 1 Hz series and computes the oxygen desaturation index over it. Nothing in
//! this crate performs I/O; every function is deterministic.

pub mod channel;
pub mod cleaner;
pub mod error;
pub mod filters;
pub mod odi;
pub mod rolling;
pub mod stats;

pub use channel::{Channel, SamplingRate};
pub use cleaner::{CleanedSeries, CleanerConfig, SignalCleaner, MIN_VIABLE_SECONDS, TARGET_SECONDS};
pub use error::{SignalError, SignalResult};
pub use odi::{count_odi, DesaturationCounter};
