//! Cache module for upstream lookup outcomes
//!
//! This module provides an in-memory cache manager with per-entry TTLs and the
//! cache vocabulary used by the request pipeline: endpoint-namespaced keys,
//! the cached outcome (a success body or an error payload) and the two TTL
//! classes for positive and negative results.

mod manager;

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::data::Endpoint;
use crate::error::ErrorPayload;

pub use manager::{CacheManager, CachedData};

/// Default lifetime of a successful lookup
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(60);

/// Default lifetime of a negative (error) lookup
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(20);

/// Outcome of an upstream resolution as stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    /// Normalized record, kept as an untyped JSON mapping
    Success(Value),
    /// Structured error, replayed with its original status code
    Failure(ErrorPayload),
}

impl CachedOutcome {
    /// Converts the outcome back into the handler's result type
    pub fn into_result(self) -> Result<Value, ErrorPayload> {
        match self {
            CachedOutcome::Success(value) => Ok(value),
            CachedOutcome::Failure(payload) => Err(payload),
        }
    }
}

/// Cache used by the request handlers
pub type ResponseCache = CacheManager<CachedOutcome>;

/// Cache key for a city lookup on one endpoint
///
/// The city is trimmed and lowercased, and the endpoint name is used as a
/// prefix so weather and forecast results for the same city never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `city` on `endpoint`
    pub fn new(endpoint: Endpoint, city: &str) -> Self {
        Self(format!("{}:{}", endpoint.name(), city.trim().to_lowercase()))
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Lifetimes for the two classes of cached outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// TTL for successful lookups
    pub success: Duration,
    /// TTL for negative outcomes
    pub failure: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_TTL,
            failure: DEFAULT_FAILURE_TTL,
        }
    }
}

impl CacheTtls {
    /// TTL that applies to `outcome`
    pub fn for_outcome(&self, outcome: &CachedOutcome) -> Duration {
        match outcome {
            CachedOutcome::Success(_) => self.success,
            CachedOutcome::Failure(_) => self.failure,
        }
    }
}
