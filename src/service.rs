//! Request pipeline for the weather and forecast lookups
//!
//! [`WeatherService`] runs each lookup through the same steps:
//!
//! 1. validate the city name
//! 2. serve a fresh cache entry verbatim (success or cached error)
//! 3. refuse without network I/O if no API key is configured
//! 4. fetch from the provider, with retries on network failure
//! 5. map the provider status (`404` to `not_found`, other non-200 to `upstream_error`)
//! 6. parse and normalize the body
//! 7. cache the outcome with the positive or negative TTL and return it
//!
//! The service knows nothing about the HTTP framework; handlers in
//! [`crate::api`] only translate its result into a response.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheTtls, CachedOutcome, ResponseCache};
use crate::cli::ServiceConfig;
use crate::data::normalize::{self, parse_body};
use crate::data::{Endpoint, FetchError, Fetcher, ForecastResponse};
use crate::error::{ErrorKind, ErrorPayload};

/// City used when the request has no `city` parameter
pub const DEFAULT_CITY: &str = "Taipei";

/// Longest accepted city name, in characters
pub const MAX_CITY_LEN: usize = 100;

/// Upper bound on provider body text copied into an error detail
const MAX_DETAIL_LEN: usize = 500;

/// Orchestrates validation, caching, fetching and normalization
#[derive(Debug)]
pub struct WeatherService {
    fetcher: Fetcher,
    cache: ResponseCache,
    ttls: CacheTtls,
    api_key: Option<String>,
}

impl WeatherService {
    /// Creates a service from its collaborators
    ///
    /// A blank `api_key` is treated as missing.
    pub fn new(fetcher: Fetcher, cache: ResponseCache, ttls: CacheTtls, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            cache,
            ttls,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Builds the shared HTTP client and an empty cache from configuration
    pub fn from_config(config: &ServiceConfig) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        Ok(Self::new(
            fetcher,
            ResponseCache::new(),
            config.cache,
            config.api_key.clone(),
        ))
    }

    /// The cache this service reads and writes
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Whether an upstream credential is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Current weather for `city`, as a `WeatherRecord` JSON object
    pub async fn current_weather(&self, city: &str) -> Result<Value, ErrorPayload> {
        self.lookup(Endpoint::Weather, city).await
    }

    /// Forecast for `city`, as a `ForecastResponse` JSON object
    pub async fn forecast(&self, city: &str) -> Result<Value, ErrorPayload> {
        self.lookup(Endpoint::Forecast, city).await
    }

    async fn lookup(&self, endpoint: Endpoint, city: &str) -> Result<Value, ErrorPayload> {
        info!(endpoint = endpoint.name(), city, "lookup requested");

        let city = validate_city(city)?;
        let key = CacheKey::new(endpoint, city);

        if let Some(cached) = self.cache.read(key.as_str()) {
            debug!(%key, cached_at = %cached.cached_at, remaining = ?cached.remaining, "cache hit");
            return cached.data.into_result();
        }
        debug!(%key, "cache miss");

        let Some(api_key) = self.api_key.as_deref() else {
            error!("API key not configured; set OPENWEATHER_API_KEY");
            return Err(ErrorPayload::new(
                ErrorKind::NoApiKey,
                "weather provider API key is not configured",
            ));
        };

        let result = self.resolve(endpoint, city, api_key).await;

        match &result {
            Ok(value) => self.store(key, CachedOutcome::Success(value.clone())),
            Err(payload) if payload.error.is_cacheable() => {
                self.store(key, CachedOutcome::Failure(payload.clone()))
            }
            Err(payload) => {
                debug!(%key, error = %payload.error, "outcome not cached");
            }
        }

        result
    }

    fn store(&self, key: CacheKey, outcome: CachedOutcome) {
        let ttl = self.ttls.for_outcome(&outcome);
        debug!(%key, ?ttl, "caching outcome");
        self.cache.set(key, outcome, ttl);
    }

    async fn resolve(&self, endpoint: Endpoint, city: &str, api_key: &str) -> Result<Value, ErrorPayload> {
        let query = [("q", city), ("appid", api_key), ("units", "metric")];
        let response = self.fetcher.fetch(endpoint, &query).await?;

        match response.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                warn!(endpoint = endpoint.name(), city, "provider has no such city");
                let message = provider_message(&response.body).unwrap_or_else(|| "city not found".to_string());
                return Err(ErrorPayload::new(ErrorKind::NotFound, message));
            }
            status => {
                warn!(endpoint = endpoint.name(), city, %status, "provider returned unexpected status");
                let message = provider_message(&response.body)
                    .unwrap_or_else(|| truncate(&response.body, MAX_DETAIL_LEN));
                return Err(ErrorPayload::new(
                    ErrorKind::UpstreamError,
                    format!("provider returned {}: {}", status.as_u16(), message),
                ));
            }
        }

        let raw = parse_body(&response.body)?;

        match endpoint {
            Endpoint::Weather => {
                let record = normalize::normalize_weather(&raw, city)?;
                info!("fetched weather for {}: {}°C", record.city, record.temperature);
                to_json(&record)
            }
            Endpoint::Forecast => {
                let record = normalize::normalize_forecast(&raw, city)?;
                info!("fetched forecast for {}: {} entries", record.city, record.items.len());
                to_json(&ForecastResponse::from(record))
            }
        }
    }
}

/// Checks a city name and returns it trimmed
///
/// # Returns
/// * `Ok(&str)` - The trimmed city name
/// * `Err(ErrorPayload)` - `invalid_city` if blank or longer than [`MAX_CITY_LEN`] characters
pub fn validate_city(city: &str) -> Result<&str, ErrorPayload> {
    let trimmed = city.trim();

    if trimmed.is_empty() {
        return Err(ErrorPayload::new(ErrorKind::InvalidCity, "city must not be empty"));
    }
    if trimmed.chars().count() > MAX_CITY_LEN {
        return Err(ErrorPayload::new(
            ErrorKind::InvalidCity,
            format!("city must be at most {} characters", MAX_CITY_LEN),
        ));
    }

    Ok(trimmed)
}

fn to_json<T: Serialize>(record: &T) -> Result<Value, ErrorPayload> {
    serde_json::to_value(record).map_err(|e| ErrorPayload::new(ErrorKind::InternalError, e.to_string()))
}

/// Extracts the provider's `message` field from an error body, if any
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
