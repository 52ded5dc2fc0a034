//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SqueezeError};
use crate::selector::{validate_threshold, DEFAULT_THRESHOLD};

/// Default cap on the size of an HTML document the engine will process.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 8 * 1024 * 1024;

/// Configuration of the squeezing engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SqueezeConfig {
    /// Directory where merged artifacts are written.
    pub cache_dir: Option<PathBuf>,
    /// Path or absolute URL under which merged artifacts are served.
    pub url_prefix: Option<String>,
    /// Minimum co-occurrence ratio for a group to be merged.
    pub threshold: f64,
    /// HTML responses declaring a larger body pass through untouched.
    pub max_document_bytes: usize,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            url_prefix: None,
            threshold: DEFAULT_THRESHOLD,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl SqueezeConfig {
    /// Creates a configuration with the two required settings.
    pub fn new(cache_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            url_prefix: Some(url_prefix.into()),
            ..Self::default()
        }
    }

    /// Sets the threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the maximum document size.
    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    /// Checks every rule and returns the first violation.
    pub fn validate(&self) -> Result<()> {
        match &self.cache_dir {
            Some(dir) if !dir.as_os_str().is_empty() => {}
            _ => return Err(SqueezeError::Config("cache_dir is required".into())),
        }
        match &self.url_prefix {
            Some(prefix) if !prefix.trim().is_empty() => {}
            _ => return Err(SqueezeError::Config("url_prefix is required".into())),
        }
        if self.has_absolute_prefix() {
            if let Some(prefix) = &self.url_prefix {
                url::Url::parse(prefix)
                    .map_err(|e| SqueezeError::Config(format!("url_prefix {prefix}: {e}")))?;
            }
        }
        validate_threshold(self.threshold)?;
        if self.max_document_bytes == 0 {
            return Err(SqueezeError::Config(
                "max_document_bytes must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns true if artifacts are served from another origin.
    pub fn has_absolute_prefix(&self) -> bool {
        self.url_prefix
            .as_deref()
            .is_some_and(|prefix| prefix.starts_with("http"))
    }
}
