//! # Middleware
//!
//! - `metrics`: request and error counters, served at `/metrics`.
//! - `tracing_layer`: one tracing span per request.

pub mod metrics;
pub mod tracing_layer;
