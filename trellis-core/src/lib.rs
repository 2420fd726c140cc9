//! Trellis Core
//!
//! This crate provides an incremental dependency-tracking and invalidation
//! engine. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic, branch-accurate dependency discovery
//! - Lazy, glitch-free invalidation with graded dirty levels
//! - Batched scheduling and lifecycle scopes
//!
//! Everything is single-threaded: each thread owns its own graph, and
//! reactive handles are neither `Send` nor `Sync`.
//!
//! # Architecture
//!
//! The crate is organized into two layers:
//!
//! - `graph`: the plain data model. Node IDs, dirty levels, versioned
//!   dependency sets and the cleanup bookkeeping that keeps them exact.
//! - `reactive`: the user-facing primitives and the thread-local runtime
//!   that runs effects, propagates writes and validates stale values.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::reactive::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = Effect::new({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push((count.get(), doubled.get()))
//! });
//!
//! // Update the signal; the effect re-runs automatically
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(1, 2), (5, 10)]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::ReactiveError;
