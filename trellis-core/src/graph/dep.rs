//! Dependency Sets
//!
//! A dependency set maps each subscribing effect to the run version in
//! which that effect last confirmed the dependency. Entries whose stamp no
//! longer matches the effect's current run version are stale; they are
//! skipped by notification and removed by the effect's own cleanup.

use indexmap::IndexMap;

use super::node::EffectId;

/// Subscribers of one source, each tagged with a version stamp.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: IndexMap<EffectId, u64>,
}

impl DependencySet {
    /// Create an empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stamp recorded for an effect.
    pub fn stamp(&self, effect: EffectId) -> Option<u64> {
        self.entries.get(&effect).copied()
    }

    /// Record (or refresh) an effect's stamp.
    pub fn confirm(&mut self, effect: EffectId, run_version: u64) {
        self.entries.insert(effect, run_version);
    }

    /// Remove an effect's entry, returning its stamp.
    ///
    /// Uses swap-removal: iteration order is not preserved across removals.
    pub fn remove(&mut self, effect: EffectId) -> Option<u64> {
        self.entries.swap_remove(&effect)
    }

    /// Whether the effect has an entry, stale or not.
    pub fn contains(&self, effect: EffectId) -> bool {
        self.entries.contains_key(&effect)
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy out the entries so notification can run user callbacks without
    /// holding a borrow of the graph.
    pub fn snapshot(&self) -> Vec<(EffectId, u64)> {
        self.entries.iter().map(|(id, stamp)| (*id, *stamp)).collect()
    }

    /// Iterate over subscribing effects.
    pub fn effects(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.entries.keys().copied()
    }
}
