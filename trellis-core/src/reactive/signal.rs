//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running effect or computed, the
//!    signal registers that computation as a subscriber.
//!
//! 2. When a signal's value changes (per [`Same`]), all subscribers are
//!    notified with [`DirtyLevel::Dirty`].
//!
//! 3. Notifications schedule re-execution of dependent effects; computeds
//!    just become stale and recompute on their next read.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique source ID (8 bytes)
//! - The value, behind a shared `RefCell`
//! - An equality function pointer
//!
//! The dependency set itself lives in the runtime's graph and only exists
//! while something subscribes.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::debug::DebugOp;
use super::runtime::Runtime;
use super::same::{EqualityFn, Same};
use crate::graph::{DirtyLevel, SourceId, SourceNode};

/// A reactive cell holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell. The cell is
/// removed from the graph when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: SourceId,
    value: RefCell<T>,
    equals: EqualityFn<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::remove_source(self.id);
    }
}

impl<T: Same + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, T::same)
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal that uses `equals` to decide whether a write is a
    /// change.
    pub fn with_equality(value: T, equals: EqualityFn<T>) -> Self {
        let id = SourceId::new();
        Runtime::add_source(id, SourceNode::signal());
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                equals,
            }),
        }
    }

    /// Get the signal's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value, tracking it as a dependency of the running
    /// computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        Runtime::track(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking it as a dependency.
    ///
    /// `f` must not write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.id);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        let previous = {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equals)(&current, &value) {
                return;
            }
            std::mem::replace(&mut *current, value)
        };
        // Dropped after the borrow ends so its destructor may touch the cell.
        drop(previous);

        Runtime::trigger(self.inner.id, DirtyLevel::Dirty, DebugOp::Set);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.borrow());
        self.set(new_value);
    }

    /// Mutate the value in place and notify subscribers unconditionally.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.inner.value.borrow_mut());
        self.trigger();
    }

    /// Notify subscribers as if the value had changed.
    pub fn trigger(&self) {
        Runtime::trigger(self.inner.id, DirtyLevel::Dirty, DebugOp::Set);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
