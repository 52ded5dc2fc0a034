//! Node configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `SQUEEZE_`-prefixed environment variables. Nested keys use `__`, so
//! `SQUEEZE_SQUEEZE__THRESHOLD=0.8` sets `squeeze.threshold`. Command line
//! flags are applied on top by the binary.

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use squeeze_core::{SqueezeConfig, SqueezeError};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SQUEEZE";

/// Errors raised while loading the node configuration.
#[derive(Debug, thiserror::Error)]
pub enum NodeConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error(transparent)]
    Squeeze(#[from] SqueezeError),
    #[error("document root {0} is not a directory")]
    DocumentRoot(PathBuf),
}

/// Configuration of the squeeze node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Directory whose files are served.
    pub document_root: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (pretty or json).
    pub log_format: String,
    /// Squeezing engine settings.
    pub squeeze: SqueezeConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            document_root: PathBuf::from("./public"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            squeeze: SqueezeConfig {
                cache_dir: Some(PathBuf::from("./squeezed")),
                url_prefix: Some("/squeezed".to_string()),
                ..SqueezeConfig::default()
            },
        }
    }
}

impl NodeConfig {
    /// Loads the configuration from `path` (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeConfigError> {
        Self::load_with_env(path, None)
    }

    /// Loads the configuration, reading environment variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, NodeConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Checks the engine settings and the document root.
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        self.squeeze.validate()?;
        if !self.document_root.is_dir() {
            return Err(NodeConfigError::DocumentRoot(self.document_root.clone()));
        }
        Ok(())
    }

    /// Returns the path under which merged artifacts are mounted, if they
    /// are served by this node.
    pub fn artifact_mount(&self) -> Option<String> {
        if self.squeeze.has_absolute_prefix() {
            return None;
        }
        let prefix = self.squeeze.url_prefix.as_deref()?.trim_matches('/');
        if prefix.is_empty() {
            return None;
        }
        Some(format!("/{prefix}"))
    }
}
