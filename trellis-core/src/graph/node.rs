//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! There are two kinds of node:
//!
//! - A [`SourceNode`] is a publisher: a signal, or the output side of a
//!   computed. It owns the (lazily created) dependency set of everything
//!   that read it.
//! - An [`EffectNode`] is a subscriber: a user effect, or the input side of
//!   a computed. It owns the ordered list of sources it read during its last
//!   run, plus its dirty level.

use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use smallvec::SmallVec;

use super::dep::DependencySet;

/// Unique identifier for a source (signal or computed output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an effect (user effect or computed internals).
///
/// IDs are never reused, so a stale ID left behind in another node's
/// bookkeeping can never alias a newer effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness of an effect's last result, ordered by severity.
///
/// Notifications only ever raise the level. It drops back to `Clean` when
/// the effect runs, or when validation proves that none of the computeds it
/// read actually produced a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum DirtyLevel {
    /// The last result is trustworthy.
    Clean = 0,

    /// Validation is in progress. Seeing this level again during the same
    /// validation means the graph looped back on itself.
    Querying = 1,

    /// A computed this effect reads is itself still dirty after evaluation
    /// (its getter wrote to one of its own inputs).
    MaybeDirtySideEffect = 2,

    /// A computed this effect reads had its inputs change; its output may or
    /// may not be different.
    MaybeDirty = 3,

    /// A directly read source changed. Re-running is mandatory.
    Dirty = 4,
}

impl DirtyLevel {
    /// Whether this level requires checking computed dependencies before
    /// deciding to re-run.
    pub fn is_maybe(self) -> bool {
        matches!(self, DirtyLevel::MaybeDirty | DirtyLevel::MaybeDirtySideEffect)
    }
}

/// Recompute capability of a computed node.
///
/// The graph only keeps a weak reference to it: a computed lives as long as
/// user handles to it do.
pub trait ComputedSource {
    /// Bring the cached value up to date, notifying subscribers if it
    /// changed. Called while validating a downstream effect.
    fn evaluate(&self);
}

/// A publisher node.
pub struct SourceNode {
    /// Subscribers of this source. `None` whenever nobody subscribes.
    pub(crate) subscribers: Option<DependencySet>,

    /// Set when this source is the output side of a computed.
    pub(crate) computed: Option<Weak<dyn ComputedSource>>,
}

impl SourceNode {
    /// Create a plain (signal) source.
    pub fn signal() -> Self {
        Self {
            subscribers: None,
            computed: None,
        }
    }

    /// Create the publisher side of a computed.
    pub fn computed(owner: Weak<dyn ComputedSource>) -> Self {
        Self {
            subscribers: None,
            computed: Some(owner),
        }
    }

    /// Whether this source belongs to a computed.
    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Number of live entries in the dependency set.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.as_ref().map_or(0, DependencySet::len)
    }

    /// Whether the dependency set currently exists.
    pub fn has_subscribers(&self) -> bool {
        self.subscribers.is_some()
    }
}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("subscribers", &self.subscribers)
            .field("is_computed", &self.is_computed())
            .finish()
    }
}

/// A subscriber node.
#[derive(Debug)]
pub struct EffectNode {
    /// Bumped before every run. A dependency-set entry whose stamp differs
    /// from this value is stale.
    pub(crate) run_version: u64,

    /// Sources read during the last run, in read order. Entries at
    /// `deps_len..` are leftovers pending eviction.
    pub(crate) deps: SmallVec<[SourceId; 4]>,

    /// How many entries of `deps` have been confirmed by the current run.
    pub(crate) deps_len: usize,

    pub(crate) level: DirtyLevel,

    /// Nesting depth of in-progress runs of this effect.
    pub(crate) runnings: u32,

    /// Set when a notification moved this effect away from `Clean` and the
    /// scheduler has not been queued yet.
    pub(crate) should_schedule: bool,

    /// Allow notifications to reach this effect while it is running.
    pub(crate) allow_recurse: bool,

    /// For a computed's internal effect, the computed's publisher side.
    pub(crate) publishes: Option<SourceId>,
}

impl EffectNode {
    /// Create a new effect node. Effects start dirty so the first run or
    /// read always computes.
    pub fn new(allow_recurse: bool, publishes: Option<SourceId>) -> Self {
        Self {
            run_version: 0,
            deps: SmallVec::new(),
            deps_len: 0,
            level: DirtyLevel::Dirty,
            runnings: 0,
            should_schedule: false,
            allow_recurse,
            publishes,
        }
    }

    /// Get the current dirty level.
    pub fn level(&self) -> DirtyLevel {
        self.level
    }

    /// Get the current run version.
    pub fn run_version(&self) -> u64 {
        self.run_version
    }

    /// Sources confirmed by the last completed run, in read order.
    pub fn dependencies(&self) -> &[SourceId] {
        &self.deps[..self.deps_len]
    }

    /// Whether this node is the internal effect of a computed.
    pub fn is_computed(&self) -> bool {
        self.publishes.is_some()
    }
}
