//! HTTP routes
//!
//! Thin axum handlers over [`WeatherService`]. Each handler extracts the
//! `city` query parameter, delegates, and turns the result into a JSON
//! response: the record with `200`, or an [`ErrorPayload`] with its status.
//! A malformed query string is answered the same way, as `invalid_city`.
//!
//! Browser callers are limited to an origin allowlist, by default the local
//! frontend dev servers.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, info};

use crate::error::{ErrorKind, ErrorPayload};
use crate::service::{WeatherService, DEFAULT_CITY};

/// Origins allowed by default: the frontend dev servers
pub const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
}

impl AppState {
    pub fn new(service: WeatherService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Query string accepted by `/weather` and `/forecast`
#[derive(Debug, Default, Deserialize)]
pub struct CityQuery {
    pub city: Option<String>,
}

impl CityQuery {
    /// The requested city, or [`DEFAULT_CITY`] when the parameter is absent
    ///
    /// A present but blank value is returned as-is so validation can reject it.
    pub fn city(&self) -> &str {
        self.city.as_deref().unwrap_or(DEFAULT_CITY)
    }
}

/// Builds the application router, allowing browser requests from `cors_origins`
pub fn router(state: AppState, cors_origins: &[HeaderValue]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/weather", get(weather))
        .route("/forecast", get(forecast))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// CORS policy for an explicit origin list, with credentials allowed
///
/// Methods and headers mirror the preflight request, since wildcards are
/// not permitted together with credentials.
pub fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn root() -> Json<Value> {
    info!("root endpoint accessed");
    Json(json!({
        "message": "Weather API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/weather": "Get current weather for a city",
            "/forecast": "Get 5-day weather forecast for a city",
            "/health": "Service health check",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }))
}

async fn weather(
    State(state): State<AppState>,
    query: Result<Query<CityQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => respond(state.service.current_weather(query.city()).await),
        Err(rejection) => reject_query(rejection),
    }
}

async fn forecast(
    State(state): State<AppState>,
    query: Result<Query<CityQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => respond(state.service.forecast(query.city()).await),
        Err(rejection) => reject_query(rejection),
    }
}

fn reject_query(rejection: QueryRejection) -> Response {
    debug!(error = %rejection.body_text(), "rejected query string");
    ErrorPayload::new(ErrorKind::InvalidCity, rejection.body_text()).into_response()
}

fn respond(result: Result<Value, ErrorPayload>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(payload) => payload.into_response(),
    }
}
