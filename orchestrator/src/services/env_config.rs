//! Environment-backed run configuration
//!
//! Values are loaded from:
//! 1. an explicit env file, or `.env` in the current or parent directories
//! 2. the process environment
//!
//! Process environment variables take precedence over file values.
//!
//! ## Recognised variables
//! - `NSRR_TOKEN`: archive access token (needed only for fetching)
//! - `NSRR_BASE_URL`: archive root, default `https://sleepdata.org`
//! - `MAX_RETRIES`: retries for transient download failures, default 5
//! - `MAX_THREADS`: subjects processed concurrently, default 5
//! - `LOCK_TIMEOUT_SECS`: feature-table lock wait, default 180

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared::{PipelineConfig, SharedError, SharedResult};

use crate::traits::ConfigSource;

pub const TOKEN_VAR: &str = "NSRR_TOKEN";
pub const BASE_URL_VAR: &str = "NSRR_BASE_URL";
pub const MAX_RETRIES_VAR: &str = "MAX_RETRIES";
pub const MAX_THREADS_VAR: &str = "MAX_THREADS";
pub const LOCK_TIMEOUT_VAR: &str = "LOCK_TIMEOUT_SECS";

/// Real configuration source using environment variables
#[derive(Debug, Default, Clone)]
pub struct EnvConfigSource {
    env_file: Option<PathBuf>,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env_file(env_file: impl Into<PathBuf>) -> Self {
        Self {
            env_file: Some(env_file.into()),
        }
    }

    /// Load the env file if present; dotenv never overrides variables that are already set
    fn init_env(&self) -> SharedResult<()> {
        match &self.env_file {
            Some(path) => dotenv::from_path(path)
                .map(|_| ())
                .map_err(|e| SharedError::invalid_config("env_file", format!("{}: {e}", path.display()))),
            None => {
                let _ = dotenv::dotenv();
                Ok(())
            }
        }
    }
}

impl ConfigSource for EnvConfigSource {
    fn load(&self) -> SharedResult<PipelineConfig> {
        self.init_env()?;
        config_from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> SharedResult<Option<T>> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| SharedError::invalid_config(key, raw)),
        None => Ok(None),
    }
}

/// Build a validated config from any key lookup
pub fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SharedResult<PipelineConfig> {
    let mut config = PipelineConfig::default();

    if let Some(token) = lookup(TOKEN_VAR).filter(|t| !t.trim().is_empty()) {
        config = config.with_token(token.trim());
    }
    if let Some(base_url) = lookup(BASE_URL_VAR).filter(|u| !u.trim().is_empty()) {
        config = config.with_base_url(base_url.trim());
    }
    if let Some(retries) = parse_var::<u32>(&lookup, MAX_RETRIES_VAR)? {
        config = config.with_max_retries(retries);
    }
    if let Some(workers) = parse_var::<usize>(&lookup, MAX_THREADS_VAR)? {
        config = config.with_max_workers(workers);
    }
    if let Some(secs) = parse_var::<u64>(&lookup, LOCK_TIMEOUT_VAR)? {
        config = config.with_lock_timeout(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.token.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let config = config_from_lookup(lookup(&[
            (TOKEN_VAR, " abc123 "),
            (BASE_URL_VAR, "http://localhost:9000"),
            (MAX_RETRIES_VAR, "2"),
            (MAX_THREADS_VAR, "12"),
            (LOCK_TIMEOUT_VAR, "30"),
        ]))
        .unwrap();

        assert_eq!(config.require_token().unwrap(), "abc123");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.max_workers, 12);
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let result = config_from_lookup(lookup(&[(MAX_THREADS_VAR, "many")]));
        assert!(matches!(
            result,
            Err(SharedError::InvalidConfig { field, .. }) if field == MAX_THREADS_VAR
        ));

        assert!(config_from_lookup(lookup(&[(MAX_THREADS_VAR, "0")])).is_err());
        assert!(config_from_lookup(lookup(&[(MAX_THREADS_VAR, "5000000000")])).is_err());
    }

    #[test]
    fn test_missing_env_file_is_config_error() {
        let source = EnvConfigSource::with_env_file("/definitely/not/here/.env");
        assert!(source.load().is_err());
    }
}
