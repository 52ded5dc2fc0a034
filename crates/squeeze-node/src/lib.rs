//! # Squeeze Node
//!
//! An HTTP server that serves a document root through the squeezing
//! middleware.
//!
//! ```text
//! request ─▶ TraceLayer ─┬─▶ /health, /metrics
//!                        └─▶ squeeze middleware ─┬─▶ /<url_prefix>/… (artifacts)
//!                                                └─▶ document root
//! ```
//!
//! HTML documents served from the document root are rewritten to reference
//! merged artifacts once their scripts and stylesheets have been seen
//! together often enough. The artifacts are served from the cache directory
//! under the configured URL prefix.
//!
//! ## Modules
//!
//! - [`config`] - Layered configuration (YAML file, environment)
//! - [`health`] - Health and metrics endpoints
//! - [`logging`] - Structured logging initialization

pub mod config;
pub mod health;
pub mod logging;

use axum::Router;
use squeeze_core::{Squeezer, VaryRegistry};
use squeeze_http::{squeeze, SqueezeMetrics, SqueezeState};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use config::{NodeConfig, NodeConfigError};
pub use logging::{init_logging, LogFormat};

/// Builds the middleware state for `config`, creating the artifact directory.
pub fn create_state(config: &NodeConfig) -> Result<SqueezeState, NodeConfigError> {
    let squeezer = Squeezer::new(config.squeeze.clone(), Arc::new(VaryRegistry::new()))?;
    Ok(SqueezeState::new(
        Arc::new(squeezer),
        Arc::new(SqueezeMetrics::new()),
    ))
}

/// Creates the node router.
pub fn create_router(config: &NodeConfig, state: SqueezeState) -> Router {
    let mut content = Router::new().fallback_service(ServeDir::new(&config.document_root));

    match config.artifact_mount() {
        Some(mount) => {
            tracing::debug!(
                mount = %mount,
                dir = %state.squeezer.merge_cache().dir().display(),
                "Serving merged artifacts"
            );
            content = content.nest_service(
                &mount,
                ServeDir::new(state.squeezer.merge_cache().dir()),
            );
        }
        None => tracing::info!("Merged artifacts are served externally"),
    }

    Router::new()
        .merge(health::health_routes(state.clone()))
        .merge(squeeze(content, state))
        .layer(TraceLayer::new_for_http())
}
