//! Upstream HTTP fetcher with bounded retry
//!
//! Issues GET requests to the weather provider through one shared, pooled
//! `reqwest::Client`. Network-level failures (connection refused, DNS,
//! timeouts, dropped connections) are retried with a linearly growing delay.
//! Any HTTP response, whatever its status code, is returned as-is for the
//! caller to interpret.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::Endpoint;
use crate::error::{ErrorKind, ErrorPayload};

/// Base URL of the OpenWeather 2.5 API
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries after the initial attempt
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Delay unit; the n-th retry waits n times this long
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retry schedule, kept free of any actual waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub retries: u32,
    /// Delay multiplied by the attempt index
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRY_COUNT,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts, the initial one included
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait before attempt number `attempt` (0-based)
    ///
    /// The initial attempt goes out immediately; attempt `n` waits
    /// `n * base_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Settings for the upstream client
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Provider base URL, without the endpoint path
    pub base_url: String,
    /// Hard timeout for each attempt
    pub timeout: Duration,
    /// Retry schedule for network failures
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Status and body of a provider response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Errors that can occur when fetching from the provider
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed at the network level
    #[error("upstream unreachable after {attempts} attempts: {}", describe(.source))]
    Exhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<FetchError> for ErrorPayload {
    fn from(err: FetchError) -> Self {
        match &err {
            FetchError::Exhausted { source, .. } => {
                ErrorPayload::new(ErrorKind::FetchFailed, describe(source))
            }
            FetchError::Client(_) => ErrorPayload::new(ErrorKind::InternalError, err.to_string()),
        }
    }
}

/// Client for the weather provider
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Builds the shared HTTP client for `config`
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self::with_client(client, config))
    }

    /// Creates a Fetcher around an existing HTTP client
    ///
    /// The client's own timeout settings apply instead of `config.timeout`.
    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        }
    }

    /// Fetches `endpoint` with the given query parameters
    ///
    /// # Returns
    /// * `Ok(RawResponse)` - The first HTTP response received, any status
    /// * `Err(FetchError::Exhausted)` - If every attempt failed before a response arrived
    pub async fn fetch(
        &self,
        endpoint: Endpoint,
        query: &[(&str, &str)],
    ) -> Result<RawResponse, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint.name());
        let attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                debug!(attempt = attempt + 1, ?delay, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&url, query).await {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(endpoint = endpoint.name(), "request succeeded after {} retries", attempt);
                    }
                    return Ok(response);
                }
                Err(err) => {
                    // The URL carries the API key in its query string.
                    let err = err.without_url();
                    attempt += 1;

                    if attempt >= attempts {
                        error!(
                            endpoint = endpoint.name(),
                            attempts,
                            error = %describe(&err),
                            "all upstream attempts failed"
                        );
                        return Err(FetchError::Exhausted {
                            attempts,
                            source: err,
                        });
                    }

                    warn!(
                        endpoint = endpoint.name(),
                        "upstream attempt {} of {} failed: {}",
                        attempt,
                        attempts,
                        describe(&err)
                    );
                }
            }
        }
    }

    async fn send_once(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, reqwest::Error> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(RawResponse { status, body })
    }
}

/// Flattens an error and its sources into one line
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_first_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_before(1), Duration::from_millis(500));
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_delays_strictly_increase_across_retries() {
        let policy = RetryPolicy {
            retries: 5,
            base_delay: Duration::from_millis(100),
        };

        let delays: Vec<_> = (1..policy.max_attempts()).map(|a| policy.delay_before(a)).collect();

        assert_eq!(delays.len(), 5);
        assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy {
            retries: 0,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_extreme_values_saturate() {
        let policy = RetryPolicy {
            retries: u32::MAX,
            base_delay: Duration::MAX,
        };
        assert_eq!(policy.max_attempts(), u32::MAX);
        assert_eq!(policy.delay_before(2), Duration::MAX);
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_with_client_trims_trailing_slash() {
        let config = FetchConfig {
            base_url: "http://localhost:9999/data/2.5/".to_string(),
            ..FetchConfig::default()
        };

        let fetcher = Fetcher::with_client(Client::new(), &config);

        assert_eq!(fetcher.base_url, "http://localhost:9999/data/2.5");
        assert_eq!(fetcher.retry, config.retry);
    }

    #[derive(Debug, Error)]
    #[error("error sending request")]
    struct SendError(#[source] std::io::Error);

    #[test]
    fn test_describe_walks_sources() {
        let err = SendError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));

        assert_eq!(describe(&err), "error sending request: connection refused");
    }

    #[test]
    fn test_client_build_failure_maps_to_internal_error() {
        // An invalid header value makes the builder fail without any I/O.
        let err = Client::builder().user_agent("bad\nagent").build().unwrap_err();

        let payload = ErrorPayload::from(FetchError::Client(err));

        assert_eq!(payload.error, ErrorKind::InternalError);
        assert!(payload.detail.unwrap().starts_with("failed to build HTTP client"));
    }
}
