//! Appearance and co-occurrence statistics.
//!
//! Two counters drive every merge decision:
//!
//! - [`AppearanceTracker`] counts how often each resource has been seen in
//!   any reference sequence.
//! - [`GroupStats`] counts how often each tracked [`Group`] (a contiguous,
//!   ordered run of resources) has recurred, including complement groups
//!   registered ahead of their first literal observation.
//!
//! Both counters only ever grow.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use crate::resource::ResourceId;

/// An ordered tuple of resources.
///
/// Two groups are equal only if both the members and their order match.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Group(Vec<ResourceId>);

impl Group {
    /// Creates a group from its members, in order.
    pub fn new(members: Vec<ResourceId>) -> Self {
        Self(members)
    }

    /// Returns the members in order.
    pub fn members(&self) -> &[ResourceId] {
        &self.0
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first member.
    pub fn first(&self) -> Option<&ResourceId> {
        self.0.first()
    }

    /// Returns the last member.
    pub fn last(&self) -> Option<&ResourceId> {
        self.0.last()
    }

    /// Checks if `id` is a member.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.0.contains(id)
    }

    /// Returns the members of `self` that are not in `other`, in order.
    ///
    /// Returns `None` when nothing remains.
    pub fn complement(&self, other: &[ResourceId]) -> Option<Group> {
        let rest: Vec<ResourceId> = self
            .0
            .iter()
            .filter(|id| !other.contains(id))
            .cloned()
            .collect();
        if rest.is_empty() {
            None
        } else {
            Some(Group(rest))
        }
    }
}

impl Borrow<[ResourceId]> for Group {
    fn borrow(&self) -> &[ResourceId] {
        &self.0
    }
}

impl From<&[ResourceId]> for Group {
    fn from(members: &[ResourceId]) -> Self {
        Self(members.to_vec())
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Group").field(&self.0).finish()
    }
}

/// Per-resource appearance counts.
#[derive(Debug, Clone, Default)]
pub struct AppearanceTracker {
    counts: HashMap<ResourceId, u64>,
}

impl AppearanceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one appearance for every entry of `sequence`.
    ///
    /// Duplicates are counted once per occurrence.
    pub fn observe(&mut self, sequence: &[ResourceId]) {
        for id in sequence {
            *self.counts.entry(id.clone()).or_insert(0) += 1;
        }
    }

    /// Returns how many times `id` has appeared.
    pub fn count(&self, id: &ResourceId) -> u64 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Returns the highest appearance count among `members`.
    pub fn max_count(&self, members: &[ResourceId]) -> u64 {
        members.iter().map(|id| self.count(id)).max().unwrap_or(0)
    }

    /// Checks if `id` has ever appeared.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.counts.contains_key(id)
    }

    /// Returns the number of distinct resources seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if nothing has been observed.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates over all counts.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, u64)> {
        self.counts.iter().map(|(id, count)| (id, *count))
    }
}

/// Occurrence counts of tracked groups.
#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    counts: HashMap<Group, u64>,
}

impl GroupStats {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `group` with a count of zero.
    ///
    /// Returns false if the group was already tracked; its count is kept.
    pub fn register(&mut self, group: Group) -> bool {
        if self.counts.contains_key(group.members()) {
            return false;
        }
        self.counts.insert(group, 0);
        true
    }

    /// Increments the count of a tracked group and returns the new value.
    ///
    /// Untracked groups are left untracked and `None` is returned.
    pub fn increment(&mut self, members: &[ResourceId]) -> Option<u64> {
        let count = self.counts.get_mut(members)?;
        *count += 1;
        Some(*count)
    }

    /// Returns the count of a tracked group.
    pub fn count(&self, members: &[ResourceId]) -> Option<u64> {
        self.counts.get(members).copied()
    }

    /// Checks if a group is tracked.
    pub fn contains(&self, members: &[ResourceId]) -> bool {
        self.counts.contains_key(members)
    }

    /// Returns a copy of every tracked group.
    pub fn snapshot(&self) -> Vec<Group> {
        self.counts.keys().cloned().collect()
    }

    /// Registers, for every tracked group other than `slice`, the members
    /// left over once `slice` is taken out.
    ///
    /// The set of groups is copied before any insertion.
    pub fn register_complements(&mut self, slice: &[ResourceId]) -> usize {
        let mut added = 0;
        for group in self.snapshot() {
            if group.members() == slice {
                continue;
            }
            if let Some(rest) = group.complement(slice) {
                if self.register(rest) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Returns the number of tracked groups.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if no group is tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates over all tracked groups and their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&Group, u64)> {
        self.counts.iter().map(|(group, count)| (group, *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &str) -> Vec<ResourceId> {
        names.chars().map(|c| ResourceId::new(c.to_string())).collect()
    }

    #[test]
    fn test_observe_counts_every_occurrence() {
        let mut tracker = AppearanceTracker::new();
        tracker.observe(&ids("abca"));

        assert_eq!(tracker.count(&ResourceId::new("a")), 2);
        assert_eq!(tracker.count(&ResourceId::new("b")), 1);
        assert_eq!(tracker.count(&ResourceId::new("z")), 0);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_max_count() {
        let mut tracker = AppearanceTracker::new();
        tracker.observe(&ids("ab"));
        tracker.observe(&ids("b"));

        assert_eq!(tracker.max_count(&ids("ab")), 2);
        assert_eq!(tracker.max_count(&ids("xy")), 0);
        assert_eq!(tracker.max_count(&[]), 0);
    }

    #[test]
    fn test_register_keeps_existing_count() {
        let mut stats = GroupStats::new();
        let abc = Group::new(ids("abc"));

        assert!(stats.register(abc.clone()));
        assert_eq!(stats.increment(abc.members()), Some(1));
        assert!(!stats.register(abc.clone()));
        assert_eq!(stats.count(abc.members()), Some(1));
    }

    #[test]
    fn test_increment_untracked_is_noop() {
        let mut stats = GroupStats::new();
        assert_eq!(stats.increment(&ids("ab")), None);
        assert!(stats.is_empty());
    }

    #[test]
    fn test_group_order_matters() {
        let mut stats = GroupStats::new();
        stats.register(Group::new(ids("ab")));
        assert!(stats.contains(&ids("ab")));
        assert!(!stats.contains(&ids("ba")));
    }

    #[test]
    fn test_complement_preserves_order() {
        let abcde = Group::new(ids("abcde"));
        assert_eq!(abcde.complement(&ids("bd")), Some(Group::new(ids("ace"))));
        assert_eq!(abcde.complement(&ids("abcde")), None);
    }

    #[test]
    fn test_register_complements() {
        let mut stats = GroupStats::new();
        stats.register(Group::new(ids("abcde")));
        stats.register(Group::new(ids("abc")));

        let added = stats.register_complements(&ids("abc"));

        assert_eq!(added, 1);
        assert!(stats.contains(&ids("de")));
        assert_eq!(stats.count(&ids("de")), Some(0));
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn test_register_complements_skips_empty_remainder() {
        let mut stats = GroupStats::new();
        stats.register(Group::new(ids("ab")));
        stats.register(Group::new(ids("abc")));

        assert_eq!(stats.register_complements(&ids("abc")), 0);
        assert_eq!(stats.len(), 2);
    }
}
