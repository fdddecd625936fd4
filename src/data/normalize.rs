//! Provider payload normalization
//!
//! Turns OpenWeather-shaped JSON into [`WeatherRecord`] and [`ForecastRecord`].
//! Every optional field the provider may omit is decoded as an `Option` and
//! defaulted here, in one place:
//!
//! | Field | Default |
//! |-------|---------|
//! | `name` / `city.name` | the requested city |
//! | `sys.country` / `city.country` | `""` |
//! | `main.feels_like` | `main.temp` |
//! | `main.humidity` | `0` |
//! | `weather[0].description` | `""` |
//! | `wind.speed` | `0.0` |
//! | `pop` | `0.0` |
//! | `dt` (current weather only) | now |
//!
//! `main.temp` is required. Numbers may arrive as JSON numbers or numeric
//! strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::{ForecastItem, ForecastRecord, WeatherRecord};
use crate::error::{ErrorKind, ErrorPayload};

/// Errors that can occur while normalizing a provider payload
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Body is not JSON at all
    #[error("provider returned malformed JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required field is absent or not a number
    #[error("missing or non-numeric field: {0}")]
    MissingField(&'static str),

    /// JSON is valid but does not have the expected structure
    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

impl From<NormalizeError> for ErrorPayload {
    fn from(err: NormalizeError) -> Self {
        let kind = match err {
            NormalizeError::InvalidJson(_) => ErrorKind::InvalidResponse,
            NormalizeError::MissingField(_) | NormalizeError::Shape(_) => ErrorKind::InvalidData,
        };
        ErrorPayload::new(kind, err.to_string())
    }
}

/// Parses a provider response body into untyped JSON
pub fn parse_body(body: &str) -> Result<Value, NormalizeError> {
    Ok(serde_json::from_str(body)?)
}

/// Converts a provider precipitation fraction (0-1) to a percentage
///
/// The result is rounded to two decimals so that e.g. `0.57` yields `57.0`
/// rather than `56.99999999999999`.
pub fn pop_percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 100.0).round() / 100.0
}

/// Normalizes a current-weather payload
pub fn normalize_weather(raw: &Value, requested_city: &str) -> Result<WeatherRecord, NormalizeError> {
    let payload = RawWeather::deserialize(raw).map_err(|e| NormalizeError::Shape(e.to_string()))?;

    let main = payload.main.unwrap_or_default();
    let temperature = main.temp.ok_or(NormalizeError::MissingField("main.temp"))?;

    Ok(WeatherRecord {
        city: non_empty(payload.name).unwrap_or_else(|| requested_city.to_string()),
        country: payload.sys.and_then(|sys| sys.country).unwrap_or_default(),
        temperature,
        feels_like: main.feels_like.unwrap_or(temperature),
        description: first_description(payload.weather),
        humidity: main.humidity.unwrap_or(0),
        wind_speed: payload.wind.and_then(|wind| wind.speed).unwrap_or(0.0),
        timestamp: payload.dt.and_then(from_epoch).unwrap_or_else(Utc::now),
    })
}

/// Normalizes a forecast payload
///
/// Individual malformed entries in `list` are logged and skipped; the rest
/// of the list is kept in order.
pub fn normalize_forecast(raw: &Value, requested_city: &str) -> Result<ForecastRecord, NormalizeError> {
    let payload = RawForecast::deserialize(raw).map_err(|e| NormalizeError::Shape(e.to_string()))?;

    let list = match payload.list {
        Some(Value::Array(list)) => list,
        Some(_) => return Err(NormalizeError::Shape("`list` is not an array".to_string())),
        None => return Err(NormalizeError::MissingField("list")),
    };

    let mut items = Vec::with_capacity(list.len());
    for (index, entry) in list.iter().enumerate() {
        match normalize_forecast_item(entry) {
            Ok(item) => items.push(item),
            Err(err) => warn!(index, error = %err, city = requested_city, "skipping malformed forecast item"),
        }
    }

    let city = payload.city.unwrap_or_default();

    Ok(ForecastRecord {
        city: non_empty(city.name).unwrap_or_else(|| requested_city.to_string()),
        country: city.country.unwrap_or_default(),
        items,
    })
}

fn normalize_forecast_item(entry: &Value) -> Result<ForecastItem, NormalizeError> {
    let item = RawForecastItem::deserialize(entry).map_err(|e| NormalizeError::Shape(e.to_string()))?;

    let main = item.main.unwrap_or_default();
    let temperature = main.temp.ok_or(NormalizeError::MissingField("main.temp"))?;
    let datetime = item
        .dt
        .and_then(from_epoch)
        .ok_or(NormalizeError::MissingField("dt"))?;

    Ok(ForecastItem {
        datetime,
        temperature,
        feels_like: main.feels_like.unwrap_or(temperature),
        description: first_description(item.weather),
        humidity: main.humidity.unwrap_or(0),
        wind_speed: item.wind.and_then(|wind| wind.speed).unwrap_or(0.0),
        pop: pop_percent(item.pop.unwrap_or(0.0)),
    })
}

fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn first_description(conditions: Option<Vec<RawCondition>>) -> String {
    conditions
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.description)
        .unwrap_or_default()
}

/// Accepts a JSON number or a numeric string; anything else reads as absent
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

/// Like [`lenient_f64`], truncating fractional values
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        other => coerce_f64(other).map(|f| f as i64),
    }))
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Current-weather response from the provider
#[derive(Debug, Default, Deserialize)]
struct RawWeather {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sys: Option<RawSys>,
    #[serde(default)]
    main: Option<RawMain>,
    #[serde(default)]
    weather: Option<Vec<RawCondition>>,
    #[serde(default)]
    wind: Option<RawWind>,
    #[serde(default, deserialize_with = "lenient_i64")]
    dt: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSys {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMain {
    #[serde(default, deserialize_with = "lenient_f64")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    humidity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCondition {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWind {
    #[serde(default, deserialize_with = "lenient_f64")]
    speed: Option<f64>,
}

/// Forecast response from the provider
#[derive(Debug, Default, Deserialize)]
struct RawForecast {
    #[serde(default)]
    city: Option<RawCity>,
    /// Kept untyped so one bad entry cannot fail the whole decode
    #[serde(default)]
    list: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawForecastItem {
    #[serde(default, deserialize_with = "lenient_i64")]
    dt: Option<i64>,
    #[serde(default)]
    main: Option<RawMain>,
    #[serde(default)]
    weather: Option<Vec<RawCondition>>,
    #[serde(default)]
    wind: Option<RawWind>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pop: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_payload() -> Value {
        json!({
            "coord": {"lon": 121.5319, "lat": 25.0478},
            "weather": [{"id": 801, "main": "Clouds", "description": "few clouds", "icon": "02d"}],
            "main": {"temp": 28.4, "feels_like": 31.2, "temp_min": 27.0, "temp_max": 29.9, "pressure": 1009, "humidity": 74},
            "wind": {"speed": 4.12, "deg": 90},
            "dt": 1_700_000_000,
            "sys": {"country": "TW", "sunrise": 1_699_999_000, "sunset": 1_700_040_000},
            "name": "Taipei",
            "cod": 200
        })
    }

    fn forecast_entry(dt: i64, temp: f64, pop: f64) -> Value {
        json!({
            "dt": dt,
            "main": {"temp": temp, "feels_like": temp - 1.0, "humidity": 80},
            "weather": [{"description": "light rain"}],
            "wind": {"speed": 2.5},
            "pop": pop
        })
    }

    #[test]
    fn test_normalize_weather_full_payload() {
        let record = normalize_weather(&weather_payload(), "taipei").unwrap();

        assert_eq!(record.city, "Taipei");
        assert_eq!(record.country, "TW");
        assert_eq!(record.temperature, 28.4);
        assert_eq!(record.feels_like, 31.2);
        assert_eq!(record.description, "few clouds");
        assert_eq!(record.humidity, 74);
        assert_eq!(record.wind_speed, 4.12);
        assert_eq!(record.timestamp, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_missing_wind_speed_defaults_to_zero() {
        let mut payload = weather_payload();
        payload["wind"] = json!({"deg": 90});

        let record = normalize_weather(&payload, "Taipei").unwrap();
        assert_eq!(record.wind_speed, 0.0);

        payload.as_object_mut().unwrap().remove("wind");
        let record = normalize_weather(&payload, "Taipei").unwrap();
        assert_eq!(record.wind_speed, 0.0);
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let payload = json!({"main": {"temp": 12.5}});

        let record = normalize_weather(&payload, "Reykjavik").unwrap();

        assert_eq!(record.city, "Reykjavik");
        assert_eq!(record.country, "");
        assert_eq!(record.feels_like, 12.5, "feels_like should default to temp");
        assert_eq!(record.humidity, 0);
        assert_eq!(record.description, "");
        assert_eq!(record.wind_speed, 0.0);
        assert!((Utc::now() - record.timestamp).num_seconds().abs() < 5);
    }

    #[test]
    fn test_missing_temperature_is_invalid_data() {
        let mut payload = weather_payload();
        payload["main"].as_object_mut().unwrap().remove("temp");

        let err = normalize_weather(&payload, "Taipei").unwrap_err();

        assert!(matches!(err, NormalizeError::MissingField("main.temp")));
        assert_eq!(ErrorPayload::from(err).error, ErrorKind::InvalidData);
    }

    #[test]
    fn test_non_numeric_temperature_is_invalid_data() {
        let mut payload = weather_payload();
        payload["main"]["temp"] = json!("warm");

        let err = normalize_weather(&payload, "Taipei").unwrap_err();
        assert_eq!(ErrorPayload::from(err).error, ErrorKind::InvalidData);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let mut payload = weather_payload();
        payload["main"]["temp"] = json!("21.5");
        payload["main"]["humidity"] = json!("55");

        let record = normalize_weather(&payload, "Taipei").unwrap();

        assert_eq!(record.temperature, 21.5);
        assert_eq!(record.humidity, 55);
    }

    #[test]
    fn test_out_of_range_humidity_passes_through() {
        let mut payload = weather_payload();
        payload["main"]["humidity"] = json!(250);
        assert_eq!(normalize_weather(&payload, "Taipei").unwrap().humidity, 250);

        payload["main"]["humidity"] = json!(-7);
        assert_eq!(normalize_weather(&payload, "Taipei").unwrap().humidity, -7);
    }

    #[test]
    fn test_wrong_structure_is_invalid_data() {
        let err = normalize_weather(&json!({"main": "hot"}), "Taipei").unwrap_err();
        assert!(matches!(err, NormalizeError::Shape(_)));

        let err = normalize_weather(&json!([1, 2, 3]), "Taipei").unwrap_err();
        assert_eq!(ErrorPayload::from(err).error, ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_body_rejects_non_json() {
        let err = parse_body("<html>Bad Gateway</html>").unwrap_err();

        assert!(matches!(err, NormalizeError::InvalidJson(_)));
        assert_eq!(ErrorPayload::from(err).error, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_pop_percent() {
        assert_eq!(pop_percent(0.42), 42.0);
        assert_eq!(pop_percent(0.57), 57.0);
        assert_eq!(pop_percent(0.0), 0.0);
        assert_eq!(pop_percent(1.0), 100.0);
    }

    #[test]
    fn test_pop_percent_stays_in_range_for_fractions() {
        for step in 0..=100 {
            let pop = pop_percent(step as f64 / 100.0);
            assert!((0.0..=100.0).contains(&pop), "pop {} out of range", pop);
        }
    }

    #[test]
    fn test_normalize_forecast_skips_malformed_item() {
        let payload = json!({
            "cod": "200",
            "list": [
                forecast_entry(1_700_000_000, 20.0, 0.0),
                forecast_entry(1_700_010_800, 21.0, 0.42),
                {"dt": 1_700_021_600, "main": {"humidity": 70}},
                forecast_entry(1_700_032_400, 19.0, 0.1),
                forecast_entry(1_700_043_200, 18.0, 0.9),
            ],
            "city": {"name": "Taipei", "country": "TW"}
        });

        let record = normalize_forecast(&payload, "Taipei").unwrap();

        assert_eq!(record.items.len(), 4);
        assert_eq!(record.city, "Taipei");
        assert_eq!(record.country, "TW");
        assert_eq!(record.items[1].pop, 42.0);
        assert_eq!(record.items[2].temperature, 19.0, "order should be preserved");
    }

    #[test]
    fn test_forecast_item_defaults() {
        let payload = json!({
            "list": [{"dt": 1_700_000_000, "main": {"temp": 15.0}}],
            "city": {}
        });

        let record = normalize_forecast(&payload, "Lisbon").unwrap();
        let item = &record.items[0];

        assert_eq!(record.city, "Lisbon");
        assert_eq!(record.country, "");
        assert_eq!(item.feels_like, 15.0);
        assert_eq!(item.humidity, 0);
        assert_eq!(item.wind_speed, 0.0);
        assert_eq!(item.pop, 0.0);
        assert_eq!(item.description, "");
    }

    #[test]
    fn test_forecast_item_without_dt_is_skipped() {
        let payload = json!({
            "list": [
                {"main": {"temp": 15.0}},
                "not an object",
                forecast_entry(1_700_000_000, 16.0, 0.2),
            ]
        });

        let record = normalize_forecast(&payload, "Lisbon").unwrap();

        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].temperature, 16.0);
    }

    #[test]
    fn test_forecast_without_list_is_invalid_data() {
        let err = normalize_forecast(&json!({"city": {"name": "Oslo"}}), "Oslo").unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField("list")));

        let err = normalize_forecast(&json!({"list": {"a": 1}}), "Oslo").unwrap_err();
        assert_eq!(ErrorPayload::from(err).error, ErrorKind::InvalidData);
    }

    #[test]
    fn test_forecast_empty_list_is_ok() {
        let record = normalize_forecast(&json!({"list": []}), "Oslo").unwrap();
        assert!(record.items.is_empty());
    }
}
