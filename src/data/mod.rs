//! Core data models for the weather API
//!
//! This module contains the canonical records served to callers, independent
//! of the provider's JSON shape. Provider payloads are turned into these types
//! by [`normalize`], and fetched by [`fetcher`].

pub mod fetcher;
pub mod normalize;

pub use fetcher::{FetchConfig, FetchError, Fetcher, RawResponse, RetryPolicy};
pub use normalize::{normalize_forecast, normalize_weather, NormalizeError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two lookups the service offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Current conditions
    Weather,
    /// 5-day / 3-hour forecast
    Forecast,
}

impl Endpoint {
    /// Name used both for the provider path and for cache key namespacing
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Weather => "weather",
            Endpoint::Forecast => "forecast",
        }
    }
}

/// Current weather for a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// City name as reported by the provider
    pub city: String,
    /// ISO country code, empty when the provider omits it
    pub country: String,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Feels-like temperature in Celsius
    pub feels_like: f64,
    /// Short condition text, e.g. "light rain"
    pub description: String,
    /// Relative humidity percentage, passed through unchecked
    pub humidity: i64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Observation time
    pub timestamp: DateTime<Utc>,
}

/// A single 3-hour forecast step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastItem {
    /// Start of the forecast step
    pub datetime: DateTime<Utc>,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Feels-like temperature in Celsius
    pub feels_like: f64,
    /// Short condition text
    pub description: String,
    /// Relative humidity percentage
    pub humidity: i64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Probability of precipitation, 0-100
    pub pop: f64,
}

/// Normalized forecast for a city
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub city: String,
    pub country: String,
    /// Well-formed steps in provider order
    pub items: Vec<ForecastItem>,
}

/// Body of a successful `/forecast` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub city: String,
    pub country: String,
    /// Always equal to `forecasts.len()`
    pub forecast_count: usize,
    pub forecasts: Vec<ForecastItem>,
}

impl From<ForecastRecord> for ForecastResponse {
    fn from(record: ForecastRecord) -> Self {
        Self {
            city: record.city,
            country: record.country,
            forecast_count: record.items.len(),
            forecasts: record.items,
        }
    }
}
