//! Run configuration handed to the orchestrator at construction
//!
//! Everything that used to be ambient (archive token, base URL, retry and
//! worker budgets) lives here so that a run is fully described by one value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

pub const DEFAULT_BASE_URL: &str = "https://sleepdata.org";
/// Upper bound on subjects in flight
pub const MAX_WORKERS: usize = 1024;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Archive root, e.g. `https://sleepdata.org`
    pub base_url: String,
    /// Archive access token; only needed by stages that fetch
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Retries after the first attempt for transient fetch failures
    pub max_retries: u32,
    /// Subjects in flight at once
    pub max_workers: usize,
    /// First backoff delay, doubled on each retry
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    /// Bounded wait for the feature-table lock
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            max_retries: 5,
            max_workers: 5,
            retry_base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(180),
            lock_poll_interval: Duration::from_millis(100),
        }
    }
}

impl PipelineConfig {
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Check invariants that make a run impossible before any work starts
    pub fn validate(&self) -> SharedResult<()> {
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(SharedError::invalid_config("max_workers", self.max_workers));
        }
        if self.base_url.trim().is_empty() {
            return Err(SharedError::invalid_config("base_url", "<empty>"));
        }
        if self.lock_timeout.is_zero() {
            return Err(SharedError::invalid_config("lock_timeout", "0s"));
        }
        if self.lock_poll_interval.is_zero() {
            return Err(SharedError::invalid_config("lock_poll_interval", "0s"));
        }
        Ok(())
    }

    pub fn require_token(&self) -> SharedResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SharedError::MissingConfig {
                field: "NSRR_TOKEN".to_string(),
            })
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_retries", &self.max_retries)
            .field("max_workers", &self.max_workers)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("request_timeout", &self.request_timeout)
            .field("lock_timeout", &self.lock_timeout)
            .field("lock_poll_interval", &self.lock_poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig::default().with_max_workers(0);
        assert!(matches!(
            config.validate(),
            Err(SharedError::InvalidConfig { field, .. }) if field == "max_workers"
        ));
    }

    #[test]
    fn test_worker_budget_bounded() {
        assert!(PipelineConfig::default().with_max_workers(MAX_WORKERS).validate().is_ok());
        for workers in [MAX_WORKERS + 1, usize::MAX] {
            let config = PipelineConfig::default().with_max_workers(workers);
            assert!(matches!(
                config.validate(),
                Err(SharedError::InvalidConfig { field, .. }) if field == "max_workers"
            ));
        }
    }

    #[test]
    fn test_token_required_and_redacted() {
        let config = PipelineConfig::default();
        assert!(config.require_token().is_err());

        let config = config.with_token("secret-token");
        assert_eq!(config.require_token().unwrap(), "secret-token");
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
