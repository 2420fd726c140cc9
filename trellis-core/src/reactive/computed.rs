//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its getter and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, it returns the
//!    cached value.
//!
//! 3. When a signal it reads changes, its internal effect becomes `Dirty`
//!    and everything that reads the computed becomes `MaybeDirty`.
//!
//! 4. On the next access of a downstream reader, the computed is asked to
//!    refresh. It recomputes, and only if the new value differs (per
//!    [`Same`]) does it escalate its readers to `Dirty`.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually accessed will recompute
//! - A computed whose output did not change stops the cascade there

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::debug::{DebugHooks, DebugOp};
use super::runtime::Runtime;
use super::same::{EqualityFn, Same};
use super::scope;
use super::subscriber::Subscriber;
use crate::error::ReactiveError;
use crate::graph::{ComputedSource, DirtyLevel, EffectId, EffectNode, SourceId, SourceNode};

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning yields another handle to the same node. The node leaves the
/// graph when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// Publisher side: what readers subscribe to.
    source: SourceId,

    /// Subscriber side: tracks the getter's reads.
    effect: EffectId,

    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    /// False in one-shot mode: every read recomputes, nothing is tracked.
    cacheable: bool,

    equals: EqualityFn<T>,
}

impl<T: 'static> ComputedInner<T> {
    /// Recompute if the cache cannot be trusted, notifying readers with
    /// `Dirty` when the value changed.
    fn refresh(&self) {
        let stale = !self.cacheable
            || !Runtime::is_active(self.effect)
            || Runtime::is_dirty(self.effect);
        if !stale {
            return;
        }

        let value = Runtime::run_effect(self.effect, || (self.getter)());
        let (changed, previous) = {
            let mut cached = self.value.borrow_mut();
            let changed = cached
                .as_ref()
                .map_or(true, |old| !(self.equals)(old, &value));
            (changed, cached.replace(value))
        };
        drop(previous);

        if changed {
            Runtime::trigger(self.source, DirtyLevel::Dirty, DebugOp::Set);
        }
    }
}

impl<T: 'static> ComputedSource for ComputedInner<T> {
    fn evaluate(&self) {
        self.refresh();
        Runtime::track(self.source);

        // Still dirty after running: the getter wrote to one of its own
        // inputs. Readers have to re-verify on their next access.
        let level = Runtime::dirty_level(self.effect);
        if level >= Some(DirtyLevel::MaybeDirtySideEffect) {
            debug!(
                source = ?self.source,
                level = ?level,
                "computed is still dirty after evaluation; its getter likely mutates its own dependency"
            );
            Runtime::trigger(
                self.source,
                DirtyLevel::MaybeDirtySideEffect,
                DebugOp::Invalidate,
            );
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::discard_effect(self.effect);
        Runtime::remove_source(self.source);
    }
}

impl<T: Same + 'static> Computed<T> {
    /// Create a new computed with the given getter.
    ///
    /// The getter is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, T::same, true, DebugHooks::default())
    }

    /// Create a writable computed. Writes are forwarded to `setter`; the
    /// cache is refreshed by the next read, not by the write.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(
            Box::new(getter),
            Some(Box::new(setter)),
            T::same,
            true,
            DebugHooks::default(),
        )
    }

    /// Create a computed that never caches: every read re-runs the getter
    /// and no dependencies are tracked.
    pub fn uncached<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, T::same, false, DebugHooks::default())
    }

    /// Create a computed with debug hooks on its internal effect.
    pub fn with_debug<F>(getter: F, hooks: DebugHooks) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, T::same, true, hooks)
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed whose change detection uses `equals`.
    pub fn with_equality<F>(getter: F, equals: EqualityFn<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, equals, true, DebugHooks::default())
    }

    fn build(
        getter: Box<dyn Fn() -> T>,
        setter: Option<Box<dyn Fn(T)>>,
        equals: EqualityFn<T>,
        cacheable: bool,
        debug: DebugHooks,
    ) -> Self {
        let source = SourceId::new();
        let effect = EffectId::new();

        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let owner: Weak<dyn ComputedSource> = weak.clone();
            Runtime::add_source(source, SourceNode::computed(owner));
            ComputedInner {
                source,
                effect,
                getter,
                setter,
                value: RefCell::new(None),
                cacheable,
                equals,
            }
        });

        if cacheable {
            Runtime::add_effect(
                effect,
                EffectNode::new(false, Some(source)),
                Subscriber {
                    debug,
                    ..Subscriber::default()
                },
            );
            scope::record_effect(effect, None);
        }

        Self { inner }
    }

    /// Get the computed's source ID (what readers subscribe to).
    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    /// Get the ID of the internal effect that tracks the getter's reads.
    pub fn effect_id(&self) -> EffectId {
        self.inner.effect
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value. The
    /// running effect, if any, subscribes to this computed.
    ///
    /// # Panics
    ///
    /// If the getter reads this computed during its very first evaluation.
    /// Use [`Computed::try_get`] to handle that case.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Like [`Computed::get`], reporting a re-entrant first read as
    /// [`ReactiveError::ReentrantComputed`].
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Under the same condition as [`Computed::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with(f).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        self.inner.evaluate();
        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(ReactiveError::ReentrantComputed),
        }
    }

    /// Write through the setter.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                warn!(source = ?self.inner.source, "write to readonly computed ignored");
                Err(ReactiveError::ReadonlyComputed)
            }
        }
    }

    /// Get the internal effect's dirty level, `None` if it is not tracking
    /// (uncached or stopped).
    pub fn dirty_level(&self) -> Option<DirtyLevel> {
        Runtime::dirty_level(self.inner.effect)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.source)
    }

    /// Number of sources the getter read on its last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.effect)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn is_cacheable(&self) -> bool {
        self.inner.cacheable
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.source)
            .field("dirty_level", &self.dirty_level())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
