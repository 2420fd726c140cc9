//! Error types for the reactive engine.
//!
//! Failures inside user computations are panics and propagate unchanged;
//! the variants here cover misuse of the engine's own API.

use thiserror::Error;

/// Errors reported by engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed without a setter was written to.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A computed was read from inside its own first evaluation, before it
    /// had a value.
    #[error("computed read itself before its first evaluation finished")]
    ReentrantComputed,

    /// A cleanup callback was registered while no scope was current.
    #[error("no active effect scope to associate with")]
    NoActiveScope,

    /// A stopped scope was asked to run a closure.
    #[error("cannot run an inactive effect scope")]
    InactiveScope,
}
