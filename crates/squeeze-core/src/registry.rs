//! Per-Vary-axis statistics and raw resource state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::element::ElementFamily;
use crate::resource::{RawResourceCache, ResourceId};
use crate::selector::CandidateSelector;
use crate::stats::{AppearanceTracker, Group, GroupStats};

/// Everything learned for one Vary axis value.
#[derive(Debug, Clone, Default)]
pub struct AxisState {
    /// Appearances, shared by both element families.
    pub appearances: AppearanceTracker,
    /// Group statistics for scripts.
    pub scripts: GroupStats,
    /// Group statistics for stylesheets.
    pub stylesheets: GroupStats,
    /// Raw bodies of resources served from this host.
    pub raw: RawResourceCache,
}

impl AxisState {
    /// Creates an empty axis state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the group statistics of a family.
    pub fn groups(&self, family: ElementFamily) -> &GroupStats {
        match family {
            ElementFamily::Scripts => &self.scripts,
            ElementFamily::Stylesheets => &self.stylesheets,
        }
    }

    /// Runs `selector` over a sequence of one family.
    pub fn select(
        &mut self,
        selector: &CandidateSelector,
        family: ElementFamily,
        sequence: &[ResourceId],
    ) -> Vec<Group> {
        let groups = match family {
            ElementFamily::Scripts => &mut self.scripts,
            ElementFamily::Stylesheets => &mut self.stylesheets,
        };
        selector.select(sequence, &mut self.appearances, groups)
    }

    /// Returns true if `id` has been referenced by any document on this axis.
    pub fn is_known(&self, id: &ResourceId) -> bool {
        self.appearances.contains(id)
    }
}

/// Shared handle to one axis state.
pub type SharedAxis = Arc<Mutex<AxisState>>;

/// Lazily populated map of Vary axis key to axis state.
///
/// Entries are never evicted. One registry is shared by every exchange the
/// middleware sees; tests construct their own.
#[derive(Debug, Default)]
pub struct VaryRegistry {
    axes: Mutex<HashMap<String, SharedAxis>>,
}

impl VaryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of `key`, creating it on first use.
    pub fn axis(&self, key: &str) -> SharedAxis {
        let mut axes = self.axes.lock();
        if let Some(axis) = axes.get(key) {
            return Arc::clone(axis);
        }
        tracing::debug!(axis = key, "Creating vary axis state");
        let axis = Arc::new(Mutex::new(AxisState::new()));
        axes.insert(key.to_string(), Arc::clone(&axis));
        axis
    }

    /// Returns the state of `key` if it exists.
    pub fn get(&self, key: &str) -> Option<SharedAxis> {
        self.axes.lock().get(key).cloned()
    }

    /// Returns the known axis keys.
    pub fn keys(&self) -> Vec<String> {
        self.axes.lock().keys().cloned().collect()
    }

    /// Returns the number of axes.
    pub fn len(&self) -> usize {
        self.axes.lock().len()
    }

    /// Returns true if no axis has been observed.
    pub fn is_empty(&self) -> bool {
        self.axes.lock().is_empty()
    }
}
