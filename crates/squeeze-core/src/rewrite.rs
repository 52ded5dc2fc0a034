//! Application of selections to a document's managed elements.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::element::ManagedElement;
use crate::merge::{MediaTypes, MergeCache, MergedArtifact};
use crate::resolve::{artifact_url, DocumentBase};
use crate::resource::{RawResourceCache, ResourceId};
use crate::stats::Group;

/// Everything the coordinator needs besides the elements and selections.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    /// Base against which element references are resolved.
    pub base: &'a DocumentBase,
    /// `scheme://host[:port]` of the current request.
    pub host_url: &'a str,
    /// Prefix under which merged artifacts are served.
    pub url_prefix: &'a str,
    /// Raw bodies of the current Vary axis.
    pub raw: &'a RawResourceCache,
    /// Artifact store.
    pub merge_cache: &'a MergeCache,
}

/// Result of one rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// Earliest expiry among the artifacts the document now depends on.
    pub expires: Option<DateTime<Utc>>,
    /// Whether any element was rewritten or removed.
    pub changed: bool,
    /// Number of selections whose artifact could not be written.
    pub merge_failures: usize,
}

impl RewriteOutcome {
    /// Folds another pass into this one.
    pub fn absorb(&mut self, other: RewriteOutcome) {
        self.expires = min_expiry(self.expires, other.expires);
        self.changed |= other.changed;
        self.merge_failures += other.merge_failures;
    }
}

/// Returns the earlier of two optional expiries.
pub fn min_expiry(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Builds the reference sequence of `elements`, in document order.
///
/// Elements without a resolvable reference are left out.
pub fn reference_sequence<E: ManagedElement>(
    elements: &[E],
    base: &DocumentBase,
) -> Vec<ResourceId> {
    elements
        .iter()
        .filter_map(|e| e.reference())
        .filter_map(|reference| base.resolve(&reference))
        .collect()
}

enum MergeState {
    NotReady,
    Ready(MergedArtifact),
    Failed,
}

/// Rewrites `elements` according to `selections`.
///
/// For every element served from this host, the first ready selection that
/// contains it decides its fate: the last member of the selection is pointed
/// at the merged artifact and the other members are removed.
pub fn apply<E: ManagedElement>(
    elements: &mut [E],
    selections: &[Group],
    ctx: &RewriteContext<'_>,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    if selections.is_empty() {
        return outcome;
    }

    let resolved: Vec<Option<ResourceId>> = elements
        .iter()
        .map(|e| e.reference().and_then(|r| ctx.base.resolve(&r)))
        .collect();

    let mut media = MediaTypes::new();
    for (element, id) in elements.iter().zip(&resolved) {
        if let Some(id) = id {
            media.insert(id.clone(), element.media());
        }
    }

    let mut merges: HashMap<usize, MergeState> = HashMap::new();

    for (element, id) in elements.iter_mut().zip(resolved) {
        let Some(id) = id else {
            continue;
        };
        if !id.belongs_to(ctx.host_url) {
            continue;
        }

        for (index, selection) in selections.iter().enumerate() {
            if !selection.contains(&id) {
                continue;
            }

            let state = merges
                .entry(index)
                .or_insert_with(|| merge_selection(selection, &media, ctx));
            let artifact = match state {
                MergeState::Ready(artifact) => artifact,
                MergeState::NotReady => continue,
                MergeState::Failed => {
                    outcome.merge_failures += 1;
                    // Counted once per selection.
                    *state = MergeState::NotReady;
                    continue;
                }
            };

            outcome.expires = min_expiry(outcome.expires, artifact.expires);
            if selection.last() == Some(&id) {
                let url = artifact_url(ctx.url_prefix, ctx.host_url, &artifact.id);
                tracing::debug!(resource = %id, artifact = %url, "Rewriting element");
                element.rewrite(&url);
            } else {
                tracing::debug!(resource = %id, "Removing merged element");
                element.detach();
            }
            outcome.changed = true;
            break;
        }
    }

    outcome
}

fn merge_selection(
    selection: &Group,
    media: &MediaTypes,
    ctx: &RewriteContext<'_>,
) -> MergeState {
    match ctx.merge_cache.merge(selection.members(), ctx.raw, media) {
        Ok(Some(artifact)) => MergeState::Ready(artifact),
        Ok(None) => MergeState::NotReady,
        Err(e) => {
            tracing::warn!(
                error = %e,
                members = selection.len(),
                "Failed to write merged artifact"
            );
            MergeState::Failed
        }
    }
}
