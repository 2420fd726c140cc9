//! Dependency Graph Store
//!
//! The store owns every source and effect node and implements the
//! bookkeeping half of the engine: tracking, stale-dependency eviction and
//! dirty-level escalation. It never calls user code, which lets the runtime
//! hold a mutable borrow of it only for the duration of one operation.
//!
//! # Versioned cleanup
//!
//! Each effect carries a `run_version`. Before a run the version is bumped
//! and `deps_len` is reset to zero; `deps` itself is kept. While the run
//! reads sources, [`DependencyGraph::track`] walks the old `deps` list in
//! step: if the same source is read at the same position as last time,
//! nothing structural happens. After the run, anything left past `deps_len`
//! is evicted. Re-running an effect whose reads did not change is therefore
//! O(reads) with no allocation.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::dep::DependencySet;
use super::node::{DirtyLevel, EffectId, EffectNode, SourceId, SourceNode};

/// Graph-wide counters, mostly useful in tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Live sources (signals and computed outputs).
    pub sources: usize,
    /// Live, non-stopped effects (user effects and computed internals).
    pub effects: usize,
    /// Sources whose dependency set currently exists.
    pub dependency_sets: usize,
}

/// All nodes in the graph, indexed by ID.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    sources: HashMap<SourceId, SourceNode>,
    effects: HashMap<EffectId, EffectNode>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source node.
    pub fn add_source(&mut self, id: SourceId, node: SourceNode) {
        self.sources.insert(id, node);
    }

    /// Remove a source node together with its dependency set.
    ///
    /// Effects may still list the ID in their `deps`; eviction of a missing
    /// source is a no-op, so they self-correct on their next run.
    pub fn remove_source(&mut self, id: SourceId) -> Option<SourceNode> {
        self.sources.remove(&id)
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceNode> {
        self.sources.get(&id)
    }

    /// Add an effect node.
    pub fn add_effect(&mut self, id: EffectId, node: EffectNode) {
        self.effects.insert(id, node);
    }

    /// Remove an effect node. Callers detach it first.
    pub fn remove_effect(&mut self, id: EffectId) -> Option<EffectNode> {
        self.effects.remove(&id)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectNode> {
        self.effects.get(&id)
    }

    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut EffectNode> {
        self.effects.get_mut(&id)
    }

    /// Current dirty level of an effect, `None` once it is stopped.
    pub fn level(&self, id: EffectId) -> Option<DirtyLevel> {
        self.effects.get(&id).map(|node| node.level)
    }

    /// Overwrite an effect's dirty level.
    pub fn set_level(&mut self, id: EffectId, level: DirtyLevel) {
        if let Some(node) = self.effects.get_mut(&id) {
            node.level = level;
        }
    }

    /// Register `effect` as a subscriber of `source` for its current run.
    ///
    /// Returns `true` when the dependency was newly confirmed, `false` when
    /// it had already been confirmed during this run (repeated reads) or
    /// either node is gone.
    pub fn track(&mut self, effect: EffectId, source: SourceId) -> bool {
        let Some(version) = self.effects.get(&effect).map(|node| node.run_version) else {
            return false;
        };
        let Some(src) = self.sources.get_mut(&source) else {
            return false;
        };

        let set = src.subscribers.get_or_insert_with(DependencySet::new);
        if set.stamp(effect) == Some(version) {
            return false;
        }
        set.confirm(effect, version);

        let Some(node) = self.effects.get_mut(&effect) else {
            return false;
        };
        let slot = node.deps_len;
        let previous = node.deps.get(slot).copied();
        match previous {
            Some(old) if old == source => {}
            Some(_) => node.deps[slot] = source,
            None => node.deps.push(source),
        }
        node.deps_len += 1;

        // The slot used to hold a different source. Drop the old membership
        // unless the old source was already re-confirmed earlier this run.
        if let Some(old) = previous.filter(|old| *old != source) {
            self.evict(old, effect, version);
        }
        true
    }

    /// Remove `effect` from `source`'s dependency set if its entry is stale
    /// relative to `run_version`. Destroys the set once it is empty.
    ///
    /// Returns `true` if an entry was removed.
    pub fn evict(&mut self, source: SourceId, effect: EffectId, run_version: u64) -> bool {
        let Some(src) = self.sources.get_mut(&source) else {
            return false;
        };
        let Some(set) = src.subscribers.as_mut() else {
            return false;
        };

        match set.stamp(effect) {
            Some(stamp) if stamp != run_version => {
                set.remove(effect);
                if set.is_empty() {
                    src.subscribers = None;
                }
                true
            }
            _ => false,
        }
    }

    /// Pre-run half of cleanup: start a new run version and reset the
    /// confirmed-dependency counter. `deps` is left intact for reuse.
    pub fn pre_cleanup(&mut self, effect: EffectId) {
        if let Some(node) = self.effects.get_mut(&effect) {
            node.run_version += 1;
            node.deps_len = 0;
        }
    }

    /// Post-run half of cleanup: evict every dependency the run did not
    /// confirm and truncate `deps` to the confirmed prefix.
    pub fn post_cleanup(&mut self, effect: EffectId) {
        let Some(node) = self.effects.get_mut(&effect) else {
            return;
        };
        if node.deps.len() <= node.deps_len {
            return;
        }

        let version = node.run_version;
        let stale: SmallVec<[SourceId; 4]> = node.deps.drain(node.deps_len..).collect();
        for source in stale {
            self.evict(source, effect, version);
        }
    }

    /// Drop every dependency of an effect: a cleanup bracket with no run in
    /// between.
    pub fn detach(&mut self, effect: EffectId) {
        self.pre_cleanup(effect);
        self.post_cleanup(effect);
    }

    /// Whether `effect`'s entry in `source` was confirmed by its current run.
    pub fn is_tracking(&self, effect: EffectId, source: SourceId) -> bool {
        let Some(node) = self.effects.get(&effect) else {
            return false;
        };
        self.sources
            .get(&source)
            .and_then(|src| src.subscribers.as_ref())
            .and_then(|set| set.stamp(effect))
            == Some(node.run_version)
    }

    /// Raise `effect`'s level to at least `level` for a notification
    /// arriving through `source`.
    ///
    /// Levels never go down here. The effect is flagged for scheduling only
    /// when it leaves `Clean`, so further notifications before it runs are
    /// coalesced. Returns whether the effect should be triggered now.
    pub fn escalate(&mut self, effect: EffectId, source: SourceId, level: DirtyLevel) -> bool {
        if !self.is_tracking(effect, source) {
            return false;
        }
        let Some(node) = self.effects.get_mut(&effect) else {
            return false;
        };

        if node.level < level {
            node.should_schedule |= node.level == DirtyLevel::Clean;
            node.level = level;
        }
        node.should_schedule
    }

    /// Called after an effect's trigger fired. Returns whether its scheduler
    /// should be queued, clearing the pending flag if so.
    ///
    /// A running effect is excluded from its own fan-out unless it allows
    /// recursion.
    pub fn settle_schedule(&mut self, effect: EffectId) -> bool {
        let Some(node) = self.effects.get_mut(&effect) else {
            return false;
        };
        if (node.runnings == 0 || node.allow_recurse)
            && node.level != DirtyLevel::MaybeDirtySideEffect
        {
            node.should_schedule = false;
            true
        } else {
            false
        }
    }

    /// Snapshot of a source's subscribers.
    pub fn subscribers(&self, source: SourceId) -> Vec<(EffectId, u64)> {
        self.sources
            .get(&source)
            .and_then(|src| src.subscribers.as_ref())
            .map(DependencySet::snapshot)
            .unwrap_or_default()
    }

    /// Number of entries in a source's dependency set.
    pub fn subscriber_count(&self, source: SourceId) -> usize {
        self.sources
            .get(&source)
            .map_or(0, SourceNode::subscriber_count)
    }

    /// Get graph-wide counters.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            sources: self.sources.len(),
            effects: self.effects.len(),
            dependency_sets: self
                .sources
                .values()
                .filter(|src| src.has_subscribers())
                .count(),
        }
    }
}
