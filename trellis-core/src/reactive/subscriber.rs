//! Subscriber types for the reactive system.
//!
//! A subscriber is anything the runtime can notify: user effects and the
//! internal effects of computeds. The graph only knows subscribers by
//! [`EffectId`]; this module holds the callbacks attached to those IDs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::debug::DebugHooks;
use super::runtime::Runtime;
use crate::graph::{DirtyLevel, EffectId};

/// Type-erased capability to re-run an effect.
///
/// Effects are generic over their computation's return type. Schedulers and
/// scopes only need to run them, so they go through this trait instead.
pub trait Runnable {
    /// The effect's ID.
    fn id(&self) -> EffectId;

    /// Run the computation, discarding its output.
    fn run_erased(&self);
}

/// Cloneable, type-erased handle to an effect.
///
/// This is what a scheduler hook receives: it can run the effect right
/// away, stash it for later, or drop it.
#[derive(Clone)]
pub struct EffectRef {
    inner: Rc<dyn Runnable>,
}

impl EffectRef {
    pub(crate) fn new(inner: Rc<dyn Runnable>) -> Self {
        Self { inner }
    }

    /// Get the effect's ID.
    pub fn id(&self) -> EffectId {
        self.inner.id()
    }

    /// Run the effect unconditionally.
    pub fn run(&self) {
        self.inner.run_erased();
    }

    /// Run the effect only if validation says it is stale. Returns whether
    /// it ran.
    pub fn run_if_dirty(&self) -> bool {
        if self.is_dirty() {
            self.run();
            true
        } else {
            false
        }
    }

    /// Validate the effect's dependencies; see [`Runtime::is_dirty`].
    pub fn is_dirty(&self) -> bool {
        Runtime::is_dirty(self.id())
    }

    /// Current raw dirty level, `None` once stopped.
    pub fn dirty_level(&self) -> Option<DirtyLevel> {
        Runtime::dirty_level(self.id())
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        Runtime::is_active(self.id())
    }

    /// Stop the effect.
    pub fn stop(&self) {
        Runtime::stop_effect(self.id());
    }
}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRef").field("id", &self.id()).finish()
    }
}

/// Scheduler hook: invoked instead of re-running the effect directly.
pub type Scheduler = Rc<dyn Fn(&EffectRef)>;

/// Callbacks attached to a subscriber.
#[derive(Default)]
pub(crate) struct Subscriber {
    /// Present for user effects; computeds are re-run by their readers.
    pub(crate) runner: Option<EffectRef>,

    /// Fallback callback fired on every scheduling transition.
    pub(crate) trigger: Option<Rc<dyn Fn()>>,

    pub(crate) scheduler: Option<Scheduler>,

    /// Fired once when the effect is stopped.
    pub(crate) on_stop: RefCell<Option<Box<dyn FnOnce()>>>,

    pub(crate) debug: DebugHooks,
}

impl Subscriber {
    /// The deferred work to queue once this subscriber becomes stale.
    pub(crate) fn job(&self) -> Option<ScheduledJob> {
        self.runner.as_ref().map(|effect| ScheduledJob {
            scheduler: self.scheduler.clone(),
            effect: effect.clone(),
        })
    }

    pub(crate) fn take_on_stop(&self) -> Option<Box<dyn FnOnce()>> {
        self.on_stop.borrow_mut().take()
    }
}

/// One pending entry in the scheduling queue.
pub(crate) struct ScheduledJob {
    scheduler: Option<Scheduler>,
    effect: EffectRef,
}

impl ScheduledJob {
    pub(crate) fn effect_id(&self) -> EffectId {
        self.effect.id()
    }

    /// Hand the effect to its scheduler, or re-run it if it is still dirty.
    pub(crate) fn fire(self) {
        match self.scheduler {
            Some(scheduler) => scheduler(&self.effect),
            None => {
                self.effect.run_if_dirty();
            }
        }
    }
}
