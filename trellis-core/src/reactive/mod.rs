//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects and scopes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or an effect), the signal records
//! that context as a subscriber. When the value changes, every subscriber is
//! marked dirty.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It is both a
//! source (others read it) and a subscriber (it reads others). It
//! re-evaluates only when it is read and one of its inputs really changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Re-runs go through a scheduler, which may defer them.
//!
//! ## Scopes
//!
//! An EffectScope groups effects and cleanup callbacks so they can be
//! stopped together.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: a thread-local context names
//! the running effect, and each read records itself against it. Every run
//! re-derives the dependency list, so conditional reads only subscribe to
//! the branch actually taken.
//!
//! Notification is two-phase. Writes only raise dirty levels and queue
//! jobs; computeds are refreshed lazily, during validation, in the order
//! they were read.

mod computed;
mod context;
mod debug;
mod effect;
mod runtime;
mod same;
mod scope;
mod signal;
mod subscriber;

pub use computed::Computed;
pub use context::{
    enable_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext,
};
pub use debug::{DebugHook, DebugHooks, DebugOp, DebuggerEvent};
pub use effect::{effect, stop, Effect, EffectOptions};
pub use runtime::{batch, pause_scheduling, reset_scheduling, Runtime};
pub use same::{same, EqualityFn, Same};
pub use scope::{
    effect_scope, get_current_scope, on_scope_dispose, try_on_scope_dispose, EffectScope,
};
pub use signal::Signal;
pub use subscriber::{EffectRef, Runnable, Scheduler};
