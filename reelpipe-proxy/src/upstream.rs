//! Outbound fetch client with retry and linear backoff.

use std::time::Duration;

use backon::BackoffBuilder;
use reqwest::StatusCode;
use tracing::warn;

use reelpipe_core::config::UpstreamConfig;

use crate::backoff::LinearBuilder;
use crate::route::ProxyTarget;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Transient failures persisted through every allowed attempt. The
    /// caller surfaces this as a gateway error; no response exists.
    #[error("upstream fetch failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Shared outbound HTTP client.
///
/// Cheap to clone; the inner `reqwest::Client` is reference-counted. The
/// connect and per-read timeouts live on the client, a total per-attempt
/// bound is added only for manifest fetches so streamed media is never cut
/// off mid-transfer.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Fetch a manifest with a total time bound per attempt.
    pub async fn fetch_manifest(
        &self,
        target: &ProxyTarget,
    ) -> Result<reqwest::Response, FetchError> {
        self.fetch(target, None, Some(self.config.manifest_timeout()))
            .await
    }

    /// Fetch a media body for streaming relay, forwarding the consumer's
    /// Range header when present.
    pub async fn fetch_media(
        &self,
        target: &ProxyTarget,
        range: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        self.fetch(target, range, None).await
    }

    /// Retry loop: transport errors and 429/5xx statuses are transient and
    /// retried with linear backoff; every other response is returned as-is
    /// for the caller to relay or map.
    async fn fetch(
        &self,
        target: &ProxyTarget,
        range: Option<&str>,
        total_timeout: Option<Duration>,
    ) -> Result<reqwest::Response, FetchError> {
        let retries = self.config.max_attempts.saturating_sub(1) as usize;
        let backoff = LinearBuilder::new(self.config.backoff_base(), retries).build();

        let mut attempts = 0u32;
        let mut last_error = String::new();

        for delay in std::iter::once(Duration::ZERO).chain(backoff) {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            match self.send_once(target, range, total_timeout).await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        return Ok(response);
                    }
                    warn!(
                        url = %target.url,
                        %status,
                        attempt = attempts,
                        "retryable upstream status"
                    );
                    last_error = format!("upstream status {status}");
                }
                Err(e) => {
                    warn!(
                        url = %target.url,
                        attempt = attempts,
                        error = %e,
                        "upstream request failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    async fn send_once(
        &self,
        target: &ProxyTarget,
        range: Option<&str>,
        total_timeout: Option<Duration>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.http.get(target.url.clone());

        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        // Default User-Agent if the caller didn't carry one
        if !target
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("user-agent"))
        {
            request = request.header("User-Agent", self.config.user_agent.as_str());
        }

        if let Some(range) = range {
            request = request.header("Range", range);
        }

        if let Some(timeout) = total_timeout {
            request = request.timeout(timeout);
        }

        request.send().await
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));

        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::PARTIAL_CONTENT));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
