//! Reactive Context
//!
//! The reactive context tracks which effect is currently running and
//! whether reads should be tracked at all. This enables automatic
//! dependency tracking: when a source is read, the current effect is
//! registered as its subscriber.
//!
//! # Implementation
//!
//! We use thread-local stacks. Entering an effect's run pushes it; the
//! returned guard pops it, so the previous effect is restored even if the
//! computation panics. Tracking can be paused and re-enabled with the same
//! stack discipline.
//!
//! This design supports nested reactive contexts (e.g., a computed read
//! inside an effect, or an effect created inside another effect's run).

use std::cell::{Cell, RefCell};

use crate::graph::EffectId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy)]
struct ContextEntry {
    /// The effect whose run is in progress.
    effect: EffectId,
    /// Tracking flag to restore when this run ends.
    last_should_track: bool,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    effect: EffectId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// Tracking is switched on for the duration of the context, whatever
    /// the surrounding state was.
    pub fn enter(effect: EffectId) -> Self {
        let last_should_track = SHOULD_TRACK.with(|flag| flag.replace(true));
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                effect,
                last_should_track,
            });
        });

        Self { effect }
    }

    /// Check if any effect is running.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the running effect, if any.
    pub fn current_effect() -> Option<EffectId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.effect))
    }

    /// The effect reads should be attributed to: the running effect, unless
    /// tracking is paused.
    pub fn tracking_target() -> Option<EffectId> {
        if SHOULD_TRACK.with(Cell::get) {
            Self::current_effect()
        } else {
            None
        }
    }

    /// Whether a read right now would register a dependency.
    pub fn is_tracking() -> bool {
        Self::tracking_target().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();

        // Verify we're popping the right context.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.effect, self.effect,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect, entry.effect
            );
            let _ = SHOULD_TRACK.try_with(|flag| flag.set(entry.last_should_track));
        }
    }
}

/// Stop attributing reads to the running effect until the matching
/// [`reset_tracking`].
pub fn pause_tracking() {
    push_tracking(false);
}

/// Force tracking on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    push_tracking(true);
}

/// Restore the tracking state saved by the last [`pause_tracking`] or
/// [`enable_tracking`]. Unbalanced calls fall back to tracking enabled.
pub fn reset_tracking() {
    let last = TRACK_STACK
        .try_with(|stack| stack.borrow_mut().pop())
        .ok()
        .flatten();
    let _ = SHOULD_TRACK.try_with(|flag| flag.set(last.unwrap_or(true)));
}

fn push_tracking(enabled: bool) {
    let last = SHOULD_TRACK.with(|flag| flag.replace(enabled));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(last));
}

/// Calls [`reset_tracking`] when dropped.
pub(crate) struct TrackingGuard(());

impl TrackingGuard {
    pub(crate) fn paused() -> Self {
        pause_tracking();
        Self(())
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without tracking any reads it makes.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TrackingGuard::paused();
    f()
}
