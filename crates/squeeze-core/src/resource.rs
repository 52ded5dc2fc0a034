//! Resource identifiers and the raw resource cache.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Content type of stylesheets.
pub const STYLESHEET_TYPE: &str = "text/css";

/// Absolute URL identifying one mergeable sub-resource.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource identifier from an already absolute URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the resource is served from `host_url` (`scheme://host[:port]`).
    pub fn belongs_to(&self, host_url: &str) -> bool {
        match self.0.strip_prefix(host_url.trim_end_matches('/')) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ResourceId {
    fn from(url: String) -> Self {
        Self(url)
    }
}

/// Returns the media type of a content type header value, without parameters.
pub fn mime_essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Returns true if the content type denotes a stylesheet.
pub fn is_stylesheet_type(content_type: &str) -> bool {
    mime_essence(content_type).eq_ignore_ascii_case(STYLESHEET_TYPE)
}

/// A sub-resource body captured from the application's own responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource {
    /// Response body as served (stylesheets already rebased).
    pub body: Bytes,
    /// Response content type.
    pub content_type: Option<String>,
    /// Response expiry, if the response carried one.
    pub expires: Option<DateTime<Utc>>,
}

impl RawResource {
    /// Creates a raw resource entry.
    pub fn new(
        body: impl Into<Bytes>,
        content_type: Option<String>,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            body: body.into(),
            content_type,
            expires,
        }
    }

    /// Returns true if this resource is a stylesheet.
    pub fn is_stylesheet(&self) -> bool {
        self.content_type.as_deref().is_some_and(is_stylesheet_type)
    }
}

/// Bodies of previously served sub-resources, keyed by resource identifier.
#[derive(Debug, Clone, Default)]
pub struct RawResourceCache {
    entries: HashMap<ResourceId, RawResource>,
}

impl RawResourceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `id` in full (a `200 OK` response).
    pub fn store(&mut self, id: ResourceId, resource: RawResource) {
        self.entries.insert(id, resource);
    }

    /// Replaces only the expiry of an existing entry (a `304 Not Modified` response).
    ///
    /// Returns false if nothing is cached for `id`.
    pub fn refresh_expiry(&mut self, id: &ResourceId, expires: Option<DateTime<Utc>>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.expires = expires;
                true
            }
            None => false,
        }
    }

    /// Returns the entry for `id`.
    pub fn get(&self, id: &ResourceId) -> Option<&RawResource> {
        self.entries.get(id)
    }

    /// Checks if an entry exists.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns true if every id in `ids` has an entry.
    pub fn contains_all(&self, ids: &[ResourceId]) -> bool {
        ids.iter().all(|id| self.entries.contains_key(id))
    }

    /// Copies the entries of `ids` that are present into a new cache.
    pub fn subset<'a>(&self, ids: impl IntoIterator<Item = &'a ResourceId>) -> RawResourceCache {
        let entries = ids
            .into_iter()
            .filter_map(|id| self.entries.get(id).map(|entry| (id.clone(), entry.clone())))
            .collect();
        RawResourceCache { entries }
    }

    /// Returns the number of cached resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
