//! # HTTP Middleware
//!
//! Request telemetry: structured per-request logging plus the counters
//! behind the metrics endpoint, collected in a single pass.

pub mod telemetry;

pub use telemetry::TelemetryMiddleware;
