//! Command-line and environment configuration
//!
//! This module handles parsing of CLI arguments using clap. Every option can
//! also come from an environment variable (or a `.env` file loaded before
//! parsing), and is validated into a [`ServiceConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use clap::Parser;
use reqwest::Url;
use thiserror::Error;

use crate::api::DEFAULT_CORS_ORIGINS;
use crate::cache::CacheTtls;
use crate::data::fetcher::{FetchConfig, RetryPolicy, DEFAULT_BASE_URL};

/// Error types for configuration validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The HTTP timeout is zero, negative or not a number
    #[error("Invalid HTTP timeout: {0}. Expected a positive number of seconds")]
    InvalidTimeout(f64),

    /// The retry delay is negative or not a number
    #[error("Invalid retry delay: {0}. Expected zero or a positive number of seconds")]
    InvalidRetryDelay(f64),

    /// A successful lookup would never be served from cache
    #[error("Invalid cache TTL: must be at least 1 second")]
    ZeroCacheTtl,

    /// The provider base URL does not parse or is not http(s)
    #[error("Invalid base URL: '{0}'")]
    InvalidBaseUrl(String),

    /// A CORS origin is not a bare http(s) origin
    #[error("Invalid CORS origin: '{0}'. Expected e.g. http://localhost:5173")]
    InvalidCorsOrigin(String),
}

/// City Weather API - current weather and forecasts by city name
#[derive(Parser, Debug)]
#[command(name = "cityweather")]
#[command(about = "HTTP API for current weather and 5-day forecasts by city name, with short-lived caching")]
#[command(version)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "WEATHER_API_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// OpenWeather API key
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Weather provider base URL
    #[arg(long, env = "OPENWEATHER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Seconds to cache a successful lookup
    #[arg(long, env = "CACHE_TTL_SECONDS", value_name = "SECONDS", default_value_t = 60)]
    pub cache_ttl: u64,

    /// Seconds to cache a failed lookup (not found, upstream error, unreachable)
    #[arg(long, env = "ERROR_CACHE_TTL_SECONDS", value_name = "SECONDS", default_value_t = 20)]
    pub error_cache_ttl: u64,

    /// Timeout for each upstream attempt, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECONDS", value_name = "SECONDS", default_value_t = 10.0)]
    pub http_timeout: f64,

    /// Retries after the first failed upstream attempt
    #[arg(long, env = "RETRY_COUNT", default_value_t = 2)]
    pub retry_count: u32,

    /// Delay unit between retries, in seconds; retry n waits n times this
    #[arg(long, env = "RETRY_BACKOFF_SECONDS", value_name = "SECONDS", default_value_t = 0.5)]
    pub retry_delay: f64,

    /// Browser origin allowed to call the API; repeat or comma-separate for several
    ///
    /// Defaults to the local frontend dev servers on ports 5173 and 3000.
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_name = "ORIGIN", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Also append logs to this file
    #[arg(long, env = "WEATHER_API_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Validated service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Provider credential, `None` when unset or blank
    pub api_key: Option<String>,
    /// Positive and negative cache lifetimes
    pub cache: CacheTtls,
    /// Upstream client settings
    pub fetch: FetchConfig,
    /// Origins allowed by the CORS policy
    pub cors_origins: Vec<HeaderValue>,
    /// Optional log file
    pub log_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Creates a ServiceConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(ServiceConfig)` with durations converted and the API key normalized
    /// * `Err(CliError)` if a numeric option, the base URL or a CORS origin is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if !cli.http_timeout.is_finite() || cli.http_timeout <= 0.0 {
            return Err(CliError::InvalidTimeout(cli.http_timeout));
        }
        if !cli.retry_delay.is_finite() || cli.retry_delay < 0.0 {
            return Err(CliError::InvalidRetryDelay(cli.retry_delay));
        }
        if cli.cache_ttl == 0 {
            return Err(CliError::ZeroCacheTtl);
        }
        parse_base_url(&cli.base_url)?;

        let cors_origins = if cli.cors_origins.is_empty() {
            DEFAULT_CORS_ORIGINS.into_iter().map(HeaderValue::from_static).collect()
        } else {
            cli.cors_origins
                .iter()
                .map(|origin| parse_cors_origin(origin))
                .collect::<Result<Vec<_>, _>>()?
        };

        let timeout = Duration::try_from_secs_f64(cli.http_timeout)
            .map_err(|_| CliError::InvalidTimeout(cli.http_timeout))?;
        let base_delay = Duration::try_from_secs_f64(cli.retry_delay)
            .map_err(|_| CliError::InvalidRetryDelay(cli.retry_delay))?;

        Ok(ServiceConfig {
            bind: cli.bind,
            api_key: cli
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            cache: CacheTtls {
                success: Duration::from_secs(cli.cache_ttl),
                failure: Duration::from_secs(cli.error_cache_ttl),
            },
            fetch: FetchConfig {
                base_url: cli.base_url.clone(),
                timeout,
                retry: RetryPolicy {
                    retries: cli.retry_count,
                    base_delay,
                },
            },
            cors_origins,
            log_file: cli.log_file.clone(),
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, CliError> {
    let url = Url::parse(raw).map_err(|_| CliError::InvalidBaseUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(CliError::InvalidBaseUrl(raw.to_string())),
    }
}

/// Accepts `scheme://host[:port]` with no path, as browsers send it
fn parse_cors_origin(raw: &str) -> Result<HeaderValue, CliError> {
    let origin = raw.trim().trim_end_matches('/');
    let invalid = || CliError::InvalidCorsOrigin(raw.to_string());

    let url = Url::parse(origin).map_err(|_| invalid())?;
    let bare = matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none();
    if !bare {
        return Err(invalid());
    }

    HeaderValue::from_str(origin).map_err(|_| invalid())
}
