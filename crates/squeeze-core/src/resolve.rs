//! Resolution of element references to resource identifiers.

use url::Url;

use crate::resource::ResourceId;

/// Base against which a document's references are resolved.
#[derive(Debug, Clone)]
pub struct DocumentBase {
    base: Url,
}

impl DocumentBase {
    /// Builds the base of a document served at `host_url` + `request_path`.
    ///
    /// An explicit `<base href>` wins over the request location and is always
    /// treated as a directory.
    pub fn new(host_url: &str, request_path: &str, base_href: Option<&str>) -> Option<Self> {
        let host = Url::parse(host_url).ok()?;
        let page = host.join(request_path).ok()?;

        let base = match base_href.map(str::trim).filter(|href| !href.is_empty()) {
            Some(href) => {
                let mut base = page.join(href).ok()?;
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                base
            }
            None => page,
        };

        Some(Self { base })
    }

    /// Resolves a reference found in the document.
    ///
    /// Returns `None` for empty or unparseable references.
    pub fn resolve(&self, reference: &str) -> Option<ResourceId> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        let url = if is_absolute(reference) {
            Url::parse(reference).ok()?
        } else {
            self.base.join(reference).ok()?
        };
        Some(ResourceId::new(String::from(url)))
    }
}

/// Normalizes an absolute URL into a resource identifier.
pub fn normalize(url: &str) -> Option<ResourceId> {
    Url::parse(url.trim())
        .ok()
        .map(|url| ResourceId::new(String::from(url)))
}

/// Returns the normalized `scheme://host[:port]` of a request.
pub fn host_url(scheme: &str, host: &str) -> Option<String> {
    if host.trim().is_empty() {
        return None;
    }
    let url = Url::parse(&format!("{}://{}/", scheme, host)).ok()?;
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

/// Builds the public URL of a merged artifact.
///
/// An absolute `url_prefix` is used as is; otherwise the prefix is taken as
/// a path on the requesting host.
pub fn artifact_url(url_prefix: &str, host_url: &str, artifact_id: &str) -> String {
    if url_prefix.starts_with("http") {
        return format!("{}/{}", url_prefix.trim_end_matches('/'), artifact_id);
    }
    let prefix = url_prefix.trim_matches('/');
    let host = host_url.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", host, artifact_id)
    } else {
        format!("{}/{}/{}", host, prefix, artifact_id)
    }
}

fn is_absolute(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
