//! Reactive Cell
//!
//! [`Ref`] is the fundamental reactive primitive. It holds one value and
//! tracks who depends on it.
//!
//! # How cells work
//!
//! 1. When a cell is read inside a tracked function, the cell registers
//!    that function as a dependent.
//!
//! 2. When the value is replaced with one that compares unequal, every
//!    direct subscriber is called with `(new, old)` and every dependent
//!    tracked function is re-invoked. Writing an equal value is silent.
//!
//! 3. Locks protect the value and the subscriber list, but are never held
//!    across user callbacks: the subscriber and dependent collections are
//!    snapshotted first, then iterated. A callback that mutates the cell's
//!    own collections therefore cannot corrupt the pass in progress.
//!
//! # Hazard
//!
//! A dependent that writes back to the very cell that triggered it
//! recurses synchronously. The engine does not detect this; unbounded
//! recursion exhausts the stack.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context;
use super::dependents::Dependents;

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identifier returned by [`Ref::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// A reactive container holding a value of type `T`.
///
/// Cloning a `Ref` produces another handle on the same cell, in the same
/// way the underlying `Arc`s are shared.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let value = count.get();  // registers a dependency when tracked
/// count.set(5);             // notifies subscribers and dependents
/// ```
pub struct Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Unique identifier for this cell.
    id: u64,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Direct subscriber callbacks, in registration order.
    subscribers: Arc<RwLock<Vec<(SubscriptionId, Callback<T>)>>>,

    /// Tracked functions that read this cell during their latest run.
    dependents: Arc<Dependents>,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            id: next_cell_id(),
            value: Arc::new(RwLock::new(initial)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            dependents: Dependents::new(),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the current value.
    ///
    /// If a tracked function is executing on this branch, it is registered
    /// as a dependent of this cell (registering twice is a no-op).
    pub fn get(&self) -> T {
        if let Some(tracker) = context::current() {
            if let Some(core) = tracker.core.upgrade() {
                if !core.is_stopped() {
                    self.dependents.register(tracker.id, tracker.core.clone());
                    core.record_source(&self.dependents);
                }
            }
        }
        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Replace the value and notify on change.
    ///
    /// The new value is compared with `PartialEq`; an equal write is a
    /// silent no-op. On change, direct subscribers are called with
    /// `(new, old)` in registration order, then dependent tracked functions
    /// are re-invoked in effect-ID order. Both collections are snapshotted
    /// before the first callback runs.
    pub fn set(&self, value: T) {
        let old = {
            let mut guard = self.value.write();
            if *guard == value {
                tracing::trace!(cell = self.id, "write left value unchanged");
                return;
            }
            std::mem::replace(&mut *guard, value.clone())
        };
        self.notify(&value, &old);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Register a direct callback, invoked with `(new, old)` on every
    /// change. Returns an ID for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a direct callback. Unsubscribing an ID that is not present
    /// is a no-op, not a fault.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .retain(|(existing, _)| *existing != id);
    }

    /// Number of direct subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of tracked functions currently registered as dependents.
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    fn notify(&self, new: &T, old: &T) {
        tracing::trace!(cell = self.id, "notifying subscribers and dependents");
        let subscribers: Vec<Callback<T>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(new, old);
        }
        for dependent in self.dependents.snapshot() {
            dependent.fire();
        }
    }
}

impl<T> Clone for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
            dependents: Arc::clone(&self.dependents),
        }
    }
}

impl<T> Debug for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
