//! Service implementations
//!
//! This module contains real implementations of all service traits.
//! These are the production implementations that handle actual I/O operations.

pub mod artifact_store;
pub mod biomarkers;
pub mod env_config;
pub mod feature_table;
pub mod fetcher;
pub mod signal_source;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use artifact_store::FsArtifactStore;
pub use biomarkers::StatisticalBiomarkerEngine;
pub use env_config::EnvConfigSource;
pub use feature_table::FeatureTable;
pub use fetcher::HttpFetcher;
pub use signal_source::FileSignalSource;
