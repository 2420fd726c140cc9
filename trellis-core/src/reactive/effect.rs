//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazily).
//!
//! 2. When a dependency changes, the effect's dirty level rises and its
//!    scheduler is queued. The default scheduler re-validates and re-runs.
//!
//! 3. Each run re-tracks dependencies. Sources that the run no longer
//!    reads are dropped, so branchy code always depends on exactly what it
//!    touched last time.
//!
//! # Differences from Computed
//!
//! - Computeds return a cached value; effects return whatever `run` yields
//!   and cache nothing.
//! - Computeds are lazy (compute on access); effects are eager (re-run when
//!   deps change, through their scheduler).
//!
//! # Lifetime
//!
//! The runtime keeps an effect alive until it is stopped, either directly
//! or through the scope it was created in. Dropping every handle does not
//! stop it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::debug::{DebugHooks, DebuggerEvent};
use super::runtime::Runtime;
use super::scope::{self, EffectScope};
use super::subscriber::{EffectRef, Runnable, Scheduler, Subscriber};
use crate::graph::{DirtyLevel, EffectId, EffectNode};

/// Construction options for [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,

    /// Called instead of the default "re-run if dirty" job.
    pub scheduler: Option<Scheduler>,

    /// Called on every transition that would schedule the effect, before
    /// the scheduler is queued.
    pub trigger: Option<Rc<dyn Fn()>>,

    /// Register into this scope instead of the current one.
    pub scope: Option<EffectScope>,

    /// Let the effect be notified by writes it makes while running.
    pub allow_recurse: bool,

    pub on_stop: Option<Box<dyn FnOnce()>>,

    pub debug: DebugHooks,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Install a scheduler hook.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&EffectRef) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn trigger<F>(mut self, trigger: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.trigger = Some(Rc::new(trigger));
        self
    }

    pub fn scope(mut self, scope: &EffectScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    pub fn debug(mut self, hooks: DebugHooks) -> Self {
        self.debug = hooks;
        self
    }

    pub fn on_track<F>(mut self, f: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.debug = self.debug.on_track(f);
        self
    }

    pub fn on_trigger<F>(mut self, f: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.debug = self.debug.on_trigger(f);
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("trigger", &self.trigger.is_some())
            .field("scope", &self.scope.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .field("on_stop", &self.on_stop.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// `T` is the computation's return type, handed back by [`Effect::run`].
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let _effect = Effect::new({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.set(count.get())
/// });
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

struct EffectInner<T> {
    id: EffectId,
    f: Box<dyn Fn() -> T>,
}

impl<T: 'static> Runnable for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn run_erased(&self) {
        Runtime::run_effect(self.id, || (self.f)());
    }
}

impl<T: 'static> Effect<T> {
    /// Create a new effect and run it immediately.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(f, EffectOptions::default())
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(f, EffectOptions::default().lazy(true))
    }

    /// Create an effect with explicit options.
    ///
    /// The effect is registered into `options.scope`, or else into the
    /// current scope, if that scope is active.
    pub fn with_options<F>(f: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let EffectOptions {
            lazy,
            scheduler,
            trigger,
            scope,
            allow_recurse,
            on_stop,
            debug,
        } = options;

        let id = EffectId::new();
        let inner = Rc::new(EffectInner {
            id,
            f: Box::new(f),
        });

        Runtime::add_effect(
            id,
            EffectNode::new(allow_recurse, None),
            Subscriber {
                runner: Some(EffectRef::new(inner.clone())),
                trigger,
                scheduler,
                on_stop: RefCell::new(on_stop),
                debug,
            },
        );
        scope::record_effect(id, scope.as_ref());

        let effect = Self { inner };
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Get the effect's ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Run the computation and return its value.
    ///
    /// While active, the reads it makes replace the effect's dependencies.
    /// After [`Effect::stop`], the computation still runs but nothing is
    /// tracked.
    pub fn run(&self) -> T {
        Runtime::run_effect(self.inner.id, || (self.inner.f)())
    }

    /// Stop the effect. It leaves every dependency set and is never
    /// scheduled again. Idempotent.
    pub fn stop(&self) {
        Runtime::stop_effect(self.inner.id);
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        Runtime::is_active(self.inner.id)
    }

    /// Whether the effect needs to re-run, validating "maybe" states
    /// against the computeds it reads.
    pub fn is_dirty(&self) -> bool {
        Runtime::is_dirty(self.inner.id)
    }

    /// Force the effect dirty or clean.
    pub fn set_dirty(&self, dirty: bool) {
        let level = if dirty {
            DirtyLevel::Dirty
        } else {
            DirtyLevel::Clean
        };
        Runtime::set_dirty_level(self.inner.id, level);
    }

    /// Raw dirty level, `None` once stopped.
    pub fn dirty_level(&self) -> Option<DirtyLevel> {
        Runtime::dirty_level(self.inner.id)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }

    /// A type-erased handle to this effect.
    pub fn to_ref(&self) -> EffectRef {
        EffectRef::new(self.inner.clone())
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("dirty_level", &self.dirty_level())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create and immediately run an effect.
pub fn effect<T, F>(f: F) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::new(f)
}

/// Stop an effect.
pub fn stop<T: 'static>(effect: &Effect<T>) {
    effect.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
