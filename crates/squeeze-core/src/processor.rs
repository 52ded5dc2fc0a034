//! The engine facade driven by the HTTP layer.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::SqueezeConfig;
use crate::document::HtmlDocument;
use crate::element::ElementFamily;
use crate::error::{Result, SqueezeError};
use crate::merge::MergeCache;
use crate::registry::VaryRegistry;
use crate::resolve::{normalize, DocumentBase};
use crate::resource::{is_stylesheet_type, RawResource, ResourceId};
use crate::rewrite::{self, RewriteContext, RewriteOutcome};
use crate::selector::CandidateSelector;
use crate::stats::Group;
use crate::stylesheet::rebase_urls;

/// Result of processing one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedDocument {
    /// Rewritten document, present only when `changed` is true.
    pub body: Option<String>,
    /// Whether any element was rewritten or removed.
    pub changed: bool,
    /// Earliest expiry among the artifacts the document references.
    pub expires: Option<DateTime<Utc>>,
    /// Number of artifacts that could not be written.
    pub merge_failures: usize,
}

/// What happened to a sub-resource response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseObservation {
    /// The URL is not a resource referenced from this host's documents.
    Untracked,
    /// A `200 OK` body was cached. `body` is what should be served.
    Stored {
        /// Body as cached (stylesheet references rebased).
        body: Bytes,
        /// Whether the body differs from the one served by the application.
        rebased: bool,
    },
    /// A `304 Not Modified` refreshed the expiry of a cached entry.
    Refreshed,
    /// A known resource answered with a status that does not touch the cache.
    Ignored,
}

/// A response of the application for a possible sub-resource.
#[derive(Debug, Clone)]
pub struct ResourceResponse<'a> {
    /// Absolute request URL.
    pub url: &'a str,
    /// Response status code.
    pub status: u16,
    /// Response `Content-Type`.
    pub content_type: Option<&'a str>,
    /// Response `Expires`.
    pub expires: Option<DateTime<Utc>>,
    /// Response body.
    pub body: Bytes,
}

impl<'a> ResourceResponse<'a> {
    /// Creates a response with no content type, expiry or body.
    pub fn new(url: &'a str, status: u16) -> Self {
        Self {
            url,
            status,
            content_type: None,
            expires: None,
            body: Bytes::new(),
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Sets the expiry.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Merges the sub-resources of HTML documents flowing through a pipeline.
#[derive(Debug, Clone)]
pub struct Squeezer {
    config: SqueezeConfig,
    url_prefix: String,
    selector: CandidateSelector,
    merge_cache: MergeCache,
    registry: Arc<VaryRegistry>,
}

impl Squeezer {
    /// Creates an engine from a validated configuration.
    ///
    /// Fails if a required setting is missing or the cache directory cannot
    /// be created.
    pub fn new(config: SqueezeConfig, registry: Arc<VaryRegistry>) -> Result<Self> {
        config.validate()?;

        let (Some(cache_dir), Some(url_prefix)) =
            (config.cache_dir.clone(), config.url_prefix.clone())
        else {
            return Err(SqueezeError::Config(
                "cache_dir and url_prefix are required".into(),
            ));
        };

        let selector = CandidateSelector::new(config.threshold)?;
        let merge_cache = MergeCache::open(cache_dir)?;

        tracing::info!(
            cache_dir = %merge_cache.dir().display(),
            url_prefix = %url_prefix,
            threshold = config.threshold,
            "Squeezer initialized"
        );

        Ok(Self {
            config,
            url_prefix,
            selector,
            merge_cache,
            registry,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SqueezeConfig {
        &self.config
    }

    /// Returns the artifact store.
    pub fn merge_cache(&self) -> &MergeCache {
        &self.merge_cache
    }

    /// Returns the shared per-axis state.
    pub fn registry(&self) -> &Arc<VaryRegistry> {
        &self.registry
    }

    /// Processes an HTML document served at `host_url` + `request_path`.
    ///
    /// Scripts and stylesheets are handled in two independent passes that
    /// share the axis' appearance counts.
    pub fn process_html(
        &self,
        axis_key: &str,
        host_url: &str,
        request_path: &str,
        body: &str,
    ) -> ProcessedDocument {
        if body.trim().is_empty() {
            return ProcessedDocument::default();
        }

        let mut document = HtmlDocument::parse(body);
        let Some(base) = DocumentBase::new(host_url, request_path, document.base_href()) else {
            tracing::debug!(host_url, request_path, "Unresolvable document location");
            return ProcessedDocument::default();
        };

        let mut plan: Vec<(ElementFamily, Vec<Group>)> = Vec::with_capacity(2);
        let raw = {
            let axis = self.registry.axis(axis_key);
            let mut state = axis.lock();
            for family in ElementFamily::ALL {
                let sequence = rewrite::reference_sequence(document.elements(family), &base);
                let selections = state.select(&self.selector, family, &sequence);
                plan.push((family, selections));
            }
            let members = plan
                .iter()
                .flat_map(|(_, selections)| selections.iter())
                .flat_map(|group| group.members().iter());
            state.raw.subset(members)
        };

        let ctx = RewriteContext {
            base: &base,
            host_url,
            url_prefix: &self.url_prefix,
            raw: &raw,
            merge_cache: &self.merge_cache,
        };

        let mut outcome = RewriteOutcome::default();
        for (family, selections) in &plan {
            let pass = rewrite::apply(document.elements_mut(*family), selections, &ctx);
            tracing::trace!(
                family = family.as_str(),
                selections = selections.len(),
                changed = pass.changed,
                "Rewrite pass complete"
            );
            outcome.absorb(pass);
        }

        ProcessedDocument {
            body: outcome.changed.then(|| document.serialize()),
            changed: outcome.changed,
            expires: outcome.expires,
            merge_failures: outcome.merge_failures,
        }
    }

    /// Returns true if `url` is a resource whose responses should be observed.
    ///
    /// Lets callers avoid buffering bodies of responses that will be ignored.
    pub fn is_tracked(&self, axis_key: &str, host_url: &str, url: &str) -> bool {
        let Some(id) = normalize(url) else {
            return false;
        };
        id.belongs_to(host_url)
            && self
                .registry
                .get(axis_key)
                .is_some_and(|axis| axis.lock().is_known(&id))
    }

    /// Applies the raw cache contract to a response.
    ///
    /// A `200 OK` for a known resource served from `host_url` replaces the
    /// cached entry in full; a `304 Not Modified` only refreshes its expiry.
    /// Stylesheet bodies have their relative `url(...)` references rebased
    /// before they are cached.
    pub fn observe_response(
        &self,
        axis_key: &str,
        host_url: &str,
        response: ResourceResponse<'_>,
    ) -> ResponseObservation {
        let ResourceResponse {
            url,
            status,
            content_type,
            expires,
            body,
        } = response;

        let Some(id) = normalize(url) else {
            return ResponseObservation::Untracked;
        };
        if !id.belongs_to(host_url) {
            return ResponseObservation::Untracked;
        }

        let axis = self.registry.axis(axis_key);
        let mut state = axis.lock();
        if !state.is_known(&id) {
            return ResponseObservation::Untracked;
        }

        match status {
            200 => {
                let (body, rebased) = match content_type {
                    Some(ct) if is_stylesheet_type(ct) => rebase_body(&id, body),
                    _ => (body, false),
                };
                state.raw.store(
                    id.clone(),
                    RawResource::new(body.clone(), content_type.map(str::to_string), expires),
                );
                tracing::debug!(resource = %id, bytes = body.len(), "Cached resource body");
                ResponseObservation::Stored { body, rebased }
            }
            304 => {
                if state.raw.refresh_expiry(&id, expires) {
                    tracing::debug!(resource = %id, "Refreshed resource expiry");
                    ResponseObservation::Refreshed
                } else {
                    ResponseObservation::Ignored
                }
            }
            _ => ResponseObservation::Ignored,
        }
    }
}

fn rebase_body(id: &ResourceId, body: Bytes) -> (Bytes, bool) {
    let Ok(text) = std::str::from_utf8(&body) else {
        return (body, false);
    };
    let rebased = rebase_urls(text, id.as_str());
    if rebased == text {
        (body, false)
    } else {
        (Bytes::from(rebased), true)
    }
}
