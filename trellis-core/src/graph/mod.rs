//! Dependency Graph
//!
//! This module implements the bookkeeping side of the engine: which effects
//! subscribe to which sources, and how stale each effect currently is.
//!
//! # Overview
//!
//! The graph is bipartite:
//!
//! - Source nodes are publishers (signals, and the output side of computeds).
//!   Each owns a dependency set mapping subscriber to version stamp.
//! - Effect nodes are subscribers (user effects, and the input side of
//!   computeds). Each owns the ordered list of sources it read last run.
//!
//! A computed is both: its internal effect subscribes to its inputs, and its
//! source node publishes to whoever reads it.
//!
//! # Design Decisions
//!
//! 1. Nodes live in ID-indexed maps rather than behind shared pointers, so
//!    neither side ever keeps the other alive. Links are plain IDs, removed
//!    explicitly during cleanup.
//!
//! 2. Dependency sets are created on first subscription and dropped the
//!    moment they become empty.
//!
//! 3. Nothing in this module runs user code. The runtime copies out what it
//!    needs, releases the graph, and only then calls into closures.

mod dep;
mod node;
mod store;

pub use dep::DependencySet;
pub use node::{ComputedSource, DirtyLevel, EffectId, EffectNode, SourceId, SourceNode};
pub use store::{DependencyGraph, GraphStats};
