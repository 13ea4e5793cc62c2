//! HTTP download of recordings from the sleep-data archive
//!
//! Downloads stream into `<destination>.part` and are renamed into place only
//! after the body has been fully written. Server errors, connection failures,
//! timeouts and truncated bodies are retried with exponential backoff; an
//! unauthorized token or any other client error is returned immediately.

use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use shared::PipelineConfig;

use crate::error::{FetchError, OrchestratorError, OrchestratorResult};
use crate::services::artifact_store::part_path;
use crate::traits::{FetchRequest, Fetcher};

/// Archive file-system namespace that serves raw recordings
const ARCHIVE_NAMESPACE: &str = "nsrr-gem-v1-0-0";

/// Real fetcher backed by reqwest
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &PipelineConfig) -> OrchestratorResult<Self> {
        // A redirect means the token cannot see the file; never follow it
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OrchestratorError::config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Resource URL without the query string
    pub fn resource_url(&self, request: &FetchRequest, token: &str) -> String {
        format!(
            "{}/datasets/{}/files/a/{}/m/{}/{}/{}",
            self.base_url,
            request.dataset,
            token,
            ARCHIVE_NAMESPACE,
            request.subpath.trim_matches('/'),
            request.file_name
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// One GET, streamed into `part`
    async fn attempt(&self, url: &str, token: &str, part: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .query(&[("auth_token", token)])
            .send()
            .await
            .map_err(|e| FetchError::transient(e.to_string()))?;

        let status = response.status();
        if status.is_redirection() || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Authorization {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(FetchError::transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Rejected {
                status: status.as_u16(),
            });
        }

        let mut file = fs::File::create(part).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::transient(format!("body interrupted: {e}")))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

async fn discard_partial(part: &Path) {
    if fs::remove_file(part).await.is_ok() {
        debug!("🗑️ Partial file removed: {}", part.display());
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<u64, FetchError> {
        let token = self.token.as_deref().ok_or(FetchError::MissingToken)?;
        let url = self.resource_url(request, token);
        let part = part_path(&request.destination);

        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut attempt = 0;
        loop {
            match self.attempt(&url, token, &part).await {
                Ok(bytes) => {
                    if let Err(e) = fs::rename(&part, &request.destination).await {
                        discard_partial(&part).await;
                        return Err(FetchError::Io(e));
                    }
                    return Ok(bytes);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    discard_partial(&part).await;
                    let delay = self.backoff(attempt);
                    warn!(
                        file = %request.file_name,
                        "⏳ {} (attempt {}), retrying in {}ms",
                        e,
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(FetchError::Transient { message, .. }) => {
                    discard_partial(&part).await;
                    return Err(FetchError::Transient {
                        attempts: attempt + 1,
                        message,
                    });
                }
                Err(e) => {
                    discard_partial(&part).await;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resource_url_layout() {
        let config = PipelineConfig::default().with_base_url("https://sleepdata.org/");
        let fetcher = HttpFetcher::new(&config).unwrap();
        let request = FetchRequest {
            dataset: "shhs".to_string(),
            subpath: "polysomnography/edfs/shhs1/".to_string(),
            file_name: "shhs1-200001.edf".to_string(),
            destination: PathBuf::from("/tmp/x.edf"),
        };
        assert_eq!(
            fetcher.resource_url(&request, "tok"),
            "https://sleepdata.org/datasets/shhs/files/a/tok/m/nsrr-gem-v1-0-0/polysomnography/edfs/shhs1/shhs1-200001.edf"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let config = PipelineConfig::default().with_retry_base_delay(Duration::from_millis(100));
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(fetcher.backoff(0), Duration::from_millis(100));
        assert_eq!(fetcher.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_missing_token_is_authorization_failure() {
        let fetcher = HttpFetcher::new(&PipelineConfig::default()).unwrap();
        let request = FetchRequest {
            dataset: "shhs".to_string(),
            subpath: "edfs".to_string(),
            file_name: "a-1.edf".to_string(),
            destination: PathBuf::from("/nonexistent/a-1.edf"),
        };
        assert!(matches!(fetcher.fetch(&request).await, Err(FetchError::MissingToken)));
    }
}
