//! Service-specific tests
//!
//! Each service has its own test file exercising the real implementation
//! against a temporary directory or a mock HTTP server.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::time::Duration;

    use oximetry::{CleanedSeries, TARGET_SECONDS};
    use shared::{FeatureVector, PipelineConfig, Recording};

    /// Config with fast retries and a short lock wait
    pub fn fast_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_retry_base_delay(Duration::from_millis(1))
            .with_lock_timeout(Duration::from_millis(200))
    }

    pub fn recording(id: &str) -> Recording {
        Recording::new("shhs1", id).expect("Valid test recording")
    }

    /// A full-length cleaned series with a recognisable ramp
    pub fn cleaned_series() -> CleanedSeries {
        let values = (0..TARGET_SECONDS).map(|i| 90.0 + (i % 10) as f64).collect();
        CleanedSeries::from_values(values).expect("Valid test series")
    }

    pub fn features(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }
}
