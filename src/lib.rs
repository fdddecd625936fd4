//! City Weather API Library
//!
//! This module exposes the service pipeline, cache and HTTP routes for use by
//! the binary and in integration tests.

pub mod api;
pub mod cache;
pub mod cli;
pub mod data;
pub mod error;
pub mod service;
