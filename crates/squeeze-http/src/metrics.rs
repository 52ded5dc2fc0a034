//! Prometheus metrics of the squeezing layer.

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// What happened to an HTML document.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Elements were rewritten or removed.
    Changed,
    /// The document was processed and left as is.
    Unchanged,
    /// The document was not processed (too large, not UTF-8, ...).
    Skipped,
}

impl DocumentOutcome {
    /// Returns the label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
        }
    }
}

/// Document labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DocumentLabels {
    /// Processing outcome (changed, unchanged, skipped).
    pub outcome: String,
}

/// Kind of raw cache update.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RawCacheUpdate {
    /// A `200 OK` body was stored.
    Stored,
    /// A `304 Not Modified` refreshed an expiry.
    Refreshed,
}

impl RawCacheUpdate {
    /// Returns the label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Refreshed => "refreshed",
        }
    }
}

/// Raw cache labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RawCacheLabels {
    /// Update kind (stored, refreshed).
    pub kind: String,
}

/// Metrics state container.
#[derive(Clone, Debug)]
pub struct SqueezeMetrics {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// Documents by outcome.
    pub documents_total: Family<DocumentLabels, Counter>,
    /// Raw cache updates by kind.
    pub raw_cache_updates_total: Family<RawCacheLabels, Counter>,
    /// Merged artifacts that could not be written.
    pub merge_failures_total: Counter,
}

impl Default for SqueezeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SqueezeMetrics {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let documents_total = Family::<DocumentLabels, Counter>::default();
        registry.register(
            "squeeze_documents",
            "HTML documents seen, by outcome",
            documents_total.clone(),
        );

        let raw_cache_updates_total = Family::<RawCacheLabels, Counter>::default();
        registry.register(
            "squeeze_raw_cache_updates",
            "Raw resource cache updates, by kind",
            raw_cache_updates_total.clone(),
        );

        let merge_failures_total = Counter::default();
        registry.register(
            "squeeze_merge_failures",
            "Merged artifacts that could not be written",
            merge_failures_total.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            documents_total,
            raw_cache_updates_total,
            merge_failures_total,
        }
    }

    /// Record a document outcome.
    pub fn record_document(&self, outcome: DocumentOutcome) {
        self.documents_total
            .get_or_create(&DocumentLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    /// Record a raw cache update.
    pub fn record_raw_cache_update(&self, kind: RawCacheUpdate) {
        self.raw_cache_updates_total
            .get_or_create(&RawCacheLabels {
                kind: kind.as_str().to_string(),
            })
            .inc();
    }

    /// Record merge failures.
    pub fn record_merge_failures(&self, count: usize) {
        if count > 0 {
            self.merge_failures_total.inc_by(count as u64);
        }
    }

    /// Encode metrics in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        let metrics = SqueezeMetrics::new();
        metrics.record_document(DocumentOutcome::Changed);
        metrics.record_document(DocumentOutcome::Changed);
        metrics.record_document(DocumentOutcome::Skipped);
        metrics.record_raw_cache_update(RawCacheUpdate::Refreshed);
        metrics.record_merge_failures(3);
        metrics.record_merge_failures(0);

        let output = metrics.encode().unwrap();
        assert!(output.contains("squeeze_documents_total{outcome=\"changed\"} 2"));
        assert!(output.contains("squeeze_documents_total{outcome=\"skipped\"} 1"));
        assert!(output.contains("squeeze_raw_cache_updates_total{kind=\"refreshed\"} 1"));
        assert!(output.contains("squeeze_merge_failures_total 3"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = SqueezeMetrics::new();
        let b = SqueezeMetrics::new();
        a.record_merge_failures(1);
        assert_eq!(a.merge_failures_total.get(), 1);
        assert_eq!(b.merge_failures_total.get(), 0);
    }
}
