//! Candidate selection over a reference sequence.
//!
//! Every contiguous slice of the current sequence that is already a tracked
//! group has its count bumped, and is selected when its co-occurrence ratio
//! (group count over the highest member appearance count) strictly exceeds
//! the threshold. Shorter slices are evaluated first, and whenever a tracked
//! slice is seen, the remainders of all other tracked groups are registered.
//! A group that stops co-occurring as a whole therefore already has its
//! stable parts under observation.

use crate::error::{Result, SqueezeError};
use crate::resource::ResourceId;
use crate::stats::{AppearanceTracker, Group, GroupStats};

/// Default co-occurrence threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Decides which groups of a sequence are stable enough to merge.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    threshold: f64,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl CandidateSelector {
    /// Creates a selector with the given threshold in `(0, 1]`.
    pub fn new(threshold: f64) -> Result<Self> {
        validate_threshold(threshold)?;
        Ok(Self { threshold })
    }

    /// Returns the configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Updates the statistics with `sequence` and returns the selections.
    ///
    /// Selections are ordered by the position of their first member in
    /// `sequence`.
    pub fn select(
        &self,
        sequence: &[ResourceId],
        appearances: &mut AppearanceTracker,
        groups: &mut GroupStats,
    ) -> Vec<Group> {
        if sequence.is_empty() {
            return Vec::new();
        }

        appearances.observe(sequence);
        groups.register(Group::from(sequence));

        let mut selections = Vec::new();
        for slice in slices_by_length(sequence) {
            let Some(count) = groups.increment(slice) else {
                continue;
            };

            let highest = appearances.max_count(slice).max(1);
            let ratio = count as f64 / highest as f64;
            if ratio > self.threshold {
                selections.push(Group::from(slice));
            }

            groups.register_complements(slice);
        }

        selections.sort_by_key(|selection| {
            selection
                .first()
                .and_then(|first| sequence.iter().position(|id| id == first))
                .unwrap_or(usize::MAX)
        });

        tracing::trace!(
            resources = sequence.len(),
            selections = selections.len(),
            tracked = groups.len(),
            "Evaluated reference sequence"
        );

        selections
    }
}

/// Checks that a threshold lies in `(0, 1]`.
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(SqueezeError::Config(format!(
            "`threshold` must be in (0, 1], got {}",
            threshold
        )))
    }
}

/// Returns every contiguous slice of length two or more, shortest first.
///
/// Slices of equal length keep their start order.
pub fn slices_by_length(items: &[ResourceId]) -> Vec<&[ResourceId]> {
    let len = items.len();
    let mut slices = Vec::with_capacity(len * len.saturating_sub(1) / 2);
    for start in 0..len {
        for end in (start + 2)..=len {
            slices.push(&items[start..end]);
        }
    }
    slices.sort_by_key(|slice| slice.len());
    slices
}
