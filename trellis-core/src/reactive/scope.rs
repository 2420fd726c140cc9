//! Effect Scopes
//!
//! A scope collects the effects and cleanup callbacks created while it is
//! current, so they can be torn down together. Scopes nest: a scope created
//! while another is current becomes its child (unless detached) and is
//! stopped along with it.
//!
//! Only one scope is current at a time. [`EffectScope::run`] makes a scope
//! current for the duration of a closure and restores the previous one on
//! exit, including on panic.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::EffectId;

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

/// A lifecycle group of effects, cleanup callbacks and child scopes.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    active: Cell<bool>,
    detached: bool,
    effects: RefCell<Vec<EffectId>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    scopes: RefCell<Vec<EffectScope>>,
    parent: RefCell<Option<Weak<ScopeInner>>>,
    /// Position in the parent's `scopes`.
    index: Cell<usize>,
}

impl ScopeInner {
    /// Remove the child at `index` by moving the last child into its slot.
    fn remove_child(&self, index: usize, child: &Rc<ScopeInner>) {
        let mut children = self.scopes.borrow_mut();
        let Some(last) = children.pop() else {
            return;
        };
        if Rc::ptr_eq(&last.inner, child) {
            return;
        }
        if index < children.len() {
            debug_assert!(Rc::ptr_eq(&children[index].inner, child));
            last.inner.index.set(index);
            children[index] = last;
        } else {
            children.push(last);
        }
    }
}

impl EffectScope {
    /// Create a scope. Unless `detached`, it is registered as a child of
    /// the current scope.
    pub fn new(detached: bool) -> Self {
        let parent = current_scope();
        let scope = Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                detached,
                effects: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                scopes: RefCell::new(Vec::new()),
                parent: RefCell::new(parent.as_ref().map(|p| Rc::downgrade(&p.inner))),
                index: Cell::new(0),
            }),
        };

        if !detached {
            if let Some(parent) = &parent {
                let mut children = parent.inner.scopes.borrow_mut();
                scope.inner.index.set(children.len());
                children.push(scope.clone());
            }
        }
        scope
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached
    }

    /// Number of effects owned by this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Number of registered child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }

    /// Run `f` with this scope current. Returns `None` (and logs a
    /// warning) if the scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        match self.try_run(f) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "effect scope run skipped");
                None
            }
        }
    }

    /// Like [`EffectScope::run`], reporting an inactive scope as an error.
    pub fn try_run<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        if !self.is_active() {
            return Err(ReactiveError::InactiveScope);
        }
        let _current = ScopeGuard::enter(self.clone());
        Ok(f())
    }

    /// Make this scope current until [`EffectScope::off`].
    ///
    /// Unlike [`EffectScope::run`] this is not restored automatically.
    pub fn on(&self) {
        set_current_scope(Some(self.clone()));
    }

    /// Make this scope's parent current again.
    pub fn off(&self) {
        let parent = self.parent();
        set_current_scope(parent);
    }

    fn parent(&self) -> Option<EffectScope> {
        self.inner
            .parent
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| EffectScope { inner })
    }

    /// Register a cleanup callback on this scope directly.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Stop the scope: stop its effects, run its cleanups in registration
    /// order, stop its child scopes and unregister from the parent.
    /// Idempotent.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        if !self.inner.active.replace(false) {
            return;
        }

        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        let effect_count = effects.len();
        for id in effects {
            Runtime::stop_effect(id);
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for (index, cleanup) in cleanups.into_iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                error!(
                    index,
                    message = panic_message(&*payload),
                    "scope cleanup callback panicked"
                );
            }
        }

        let children = std::mem::take(&mut *self.inner.scopes.borrow_mut());
        for child in children {
            child.stop_inner(true);
        }

        let parent = self.inner.parent.borrow_mut().take();
        if !self.inner.detached && !from_parent {
            if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
                parent.remove_child(self.inner.index.get(), &self.inner);
            }
        }

        debug!(effects = effect_count, "effect scope stopped");
    }

    fn record(&self, id: EffectId) {
        if self.is_active() {
            self.inner.effects.borrow_mut().push(id);
        }
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EffectScope {}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("detached", &self.is_detached())
            .field("effects", &self.effect_count())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Restores the previously current scope on drop.
struct ScopeGuard {
    previous: Option<EffectScope>,
}

impl ScopeGuard {
    fn enter(scope: EffectScope) -> Self {
        Self {
            previous: set_current_scope(Some(scope)),
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = ACTIVE_SCOPE.try_with(|slot| slot.replace(previous));
    }
}

fn set_current_scope(scope: Option<EffectScope>) -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|slot| slot.replace(scope))
}

fn current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|slot| slot.borrow().clone())
}

/// Register an effect with `scope`, or with the current scope.
pub(crate) fn record_effect(id: EffectId, scope: Option<&EffectScope>) {
    let scope = scope.cloned().or_else(current_scope);
    if let Some(scope) = scope {
        scope.record(id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Create a new scope.
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// The scope that is current right now, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    current_scope()
}

/// Register `f` to run when the current scope stops.
pub fn try_on_scope_dispose<F>(f: F) -> Result<(), ReactiveError>
where
    F: FnOnce() + 'static,
{
    match current_scope() {
        Some(scope) => {
            scope.on_cleanup(f);
            Ok(())
        }
        None => Err(ReactiveError::NoActiveScope),
    }
}

/// Register `f` to run when the current scope stops. With no current
/// scope, logs a warning unless `fail_silently` is set.
pub fn on_scope_dispose<F>(f: F, fail_silently: bool)
where
    F: FnOnce() + 'static,
{
    if let Err(err) = try_on_scope_dispose(f) {
        if !fail_silently {
            warn!(error = %err, "on_scope_dispose() called outside of a scope");
        }
    }
}
