//! Content-addressed store of merged artifacts.
//!
//! A merged artifact is the concatenation of the bodies of a selection,
//! stored at `<cache_dir>/<sha1 hex><.ext>`. The name is derived from the
//! content, so a file that already exists is never written again.

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::resource::{mime_essence, RawResourceCache, ResourceId};

/// Media attribute of each element seen in the current document.
pub type MediaTypes = HashMap<ResourceId, Option<String>>;

/// A merged artifact ready to be referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    /// File name inside the cache directory (`<digest><.ext>`).
    pub id: String,
    /// Earliest expiry among the merged resources.
    pub expires: Option<DateTime<Utc>>,
    /// Whether this call wrote the file.
    pub created: bool,
}

/// Concatenated body of a selection, before it is written.
#[derive(Debug, Clone)]
pub struct MergedBody {
    /// Concatenated bytes.
    pub body: Vec<u8>,
    /// Earliest expiry among the members.
    pub expires: Option<DateTime<Utc>>,
    /// Extension guessed from the first member's content type.
    pub extension: Option<&'static str>,
}

impl MergedBody {
    /// Returns the artifact identifier of this body.
    pub fn artifact_id(&self) -> String {
        let digest = digest(&self.body);
        match self.extension {
            Some(ext) => format!("{}.{}", digest, ext),
            None => digest,
        }
    }
}

/// Write-once artifact store rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct MergeCache {
    dir: PathBuf,
}

impl MergeCache {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of an artifact.
    pub fn path_for(&self, artifact_id: &str) -> PathBuf {
        self.dir.join(artifact_id)
    }

    /// Checks if an artifact exists on disk.
    pub fn contains(&self, artifact_id: &str) -> bool {
        self.path_for(artifact_id).exists()
    }

    /// Merges `selection` into a single artifact.
    ///
    /// Returns `Ok(None)` while any member is missing from `raw`.
    pub fn merge(
        &self,
        selection: &[ResourceId],
        raw: &RawResourceCache,
        media: &MediaTypes,
    ) -> Result<Option<MergedArtifact>> {
        let Some(merged) = concatenate(selection, raw, media) else {
            return Ok(None);
        };

        let id = merged.artifact_id();
        let created = self.write_once(&id, &merged.body)?;
        if created {
            tracing::debug!(
                artifact = %id,
                members = selection.len(),
                bytes = merged.body.len(),
                "Merged artifact written"
            );
        }

        Ok(Some(MergedArtifact {
            id,
            expires: merged.expires,
            created,
        }))
    }

    /// Writes `body` under `artifact_id` unless the file already exists.
    ///
    /// The body goes to a temporary file in the cache directory first and is
    /// renamed into place, so concurrent writers never expose a partial file.
    fn write_once(&self, artifact_id: &str, body: &[u8]) -> Result<bool> {
        if self.contains(artifact_id) {
            return Ok(false);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(artifact_id))?;
        Ok(true)
    }
}

/// Concatenates the bodies of `selection` in order.
///
/// Stylesheets with a non-default media type are wrapped in an `@media`
/// block. Returns `None` if any member is missing from `raw`.
pub fn concatenate(
    selection: &[ResourceId],
    raw: &RawResourceCache,
    media: &MediaTypes,
) -> Option<MergedBody> {
    if !raw.contains_all(selection) {
        return None;
    }

    let extension = raw
        .get(selection.first()?)?
        .content_type
        .as_deref()
        .and_then(extension_for);

    let mut body = Vec::new();
    let mut expires: Option<DateTime<Utc>> = None;
    for id in selection {
        let resource = raw.get(id)?;

        if let Some(ttl) = resource.expires {
            expires = Some(expires.map_or(ttl, |current| current.min(ttl)));
        }

        let media_type = media
            .get(id)
            .and_then(|m| m.as_deref())
            .filter(|m| !is_default_media(m));

        match media_type {
            Some(media_type) if resource.is_stylesheet() => {
                body.extend_from_slice(format!("@media {} {{\n", media_type).as_bytes());
                body.extend_from_slice(&resource.body);
                body.extend_from_slice(b"}\n");
            }
            _ => body.extend_from_slice(&resource.body),
        }
    }

    Some(MergedBody {
        body,
        expires,
        extension,
    })
}

/// Returns the hex SHA-1 digest of `body`.
pub fn digest(body: &[u8]) -> String {
    hex::encode(Sha1::digest(body))
}

/// Guesses a file extension (without the dot) for a content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    mime_guess::get_mime_extensions_str(mime_essence(content_type))
        .and_then(|exts| exts.first().copied())
}

fn is_default_media(media: &str) -> bool {
    let media = media.trim();
    media.is_empty() || media.eq_ignore_ascii_case("all")
}
