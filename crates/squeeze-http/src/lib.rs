//! HTTP integration of the squeezing engine.
//!
//! Provides an axum middleware that merges the scripts and stylesheets of
//! HTML responses and feeds sub-resource responses into the engine's raw
//! resource cache.

pub mod headers;
pub mod metrics;
pub mod middleware;
pub mod vary;

pub use metrics::{DocumentOutcome, RawCacheUpdate, SqueezeMetrics};
pub use middleware::{squeeze, squeeze_middleware, RequestLocation, SqueezeState};
pub use vary::vary_key;
