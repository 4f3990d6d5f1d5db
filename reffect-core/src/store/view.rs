//! Read-Only Views and Actions
//!
//! A [`ReadOnlyView`] is a projection over a [`ReactiveMap`] whose public
//! surface has no setter: reads are unrestricted and reactive, and the only
//! write path is [`perform`](ReadOnlyView::perform), which dispatches to a
//! closed registry of named actions fixed at construction. Every observable
//! mutation of the viewed state is therefore attributable to exactly one
//! named action invocation.
//!
//! [`ReadOnlyRef`] is the single-cell counterpart: a handle exposing
//! `get`/`subscribe` but no `set`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::StoreError;
use crate::reactive::{Ref, SubscriptionId};
use crate::store::map::{Node, ReactiveMap};

/// Read-only projection of a single [`Ref`].
///
/// Reads register dependencies exactly like the underlying cell's; the
/// write surface is simply absent.
pub struct ReadOnlyRef<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Ref<T>,
}

impl<T> ReadOnlyRef<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(inner: Ref<T>) -> Self {
        Self { inner }
    }

    /// Get the current value, registering a dependency when tracked.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.get_untracked()
    }

    /// Register a direct `(new, old)` callback on the underlying cell.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.inner.subscribe(callback)
    }

    /// Remove a direct callback. Absent IDs are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}

impl<T> Clone for ReadOnlyRef<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> From<Ref<T>> for ReadOnlyRef<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(inner: Ref<T>) -> Self {
        Self::new(inner)
    }
}

type ActionFn = Arc<dyn Fn(&ReactiveMap, &[Value]) -> Result<Value, StoreError> + Send + Sync>;

/// A registry of named mutation procedures.
///
/// Actions are registered before the view is constructed; handing the
/// registry to [`ReadOnlyView::new`] seals it. An action receives the
/// underlying map (its only write access) and the caller's arguments.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionFn>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure under a name. Registering the same name twice
    /// replaces the earlier procedure.
    pub fn register<F>(&mut self, name: impl Into<String>, action: F) -> &mut Self
    where
        F: Fn(&ReactiveMap, &[Value]) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&ReactiveMap, &[Value]) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        self.register(name, action);
        self
    }

    fn get(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }

    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Read-only projection over a [`ReactiveMap`] with a closed set of named
/// actions as the only write path.
///
/// There is no setter anywhere on this type, so "writing directly to the
/// view" is rejected at compile time rather than at run time.
///
/// # Example
///
/// ```rust,ignore
/// let state = ReactiveMap::from_value(json!({"count": 0}))?;
/// let actions = ActionRegistry::new()
///     .with("increment", |state, _args| {
///         let next = state.get("count")?.as_i64().unwrap_or(0) + 1;
///         state.set("count", next);
///         Ok(Value::from(next))
///     });
/// let view = ReadOnlyView::new(state, actions);
///
/// view.perform("increment", &[])?;   // the only legal write path
/// view.read("count")?;               // reactive, unrestricted
/// ```
#[derive(Clone)]
pub struct ReadOnlyView {
    state: ReactiveMap,
    actions: Arc<ActionRegistry>,
}

impl ReadOnlyView {
    /// Wrap an existing map. The registry is sealed from here on: actions
    /// cannot be added or removed through the view.
    pub fn new(state: ReactiveMap, actions: ActionRegistry) -> Self {
        Self {
            state,
            actions: Arc::new(actions),
        }
    }

    /// Read the value at a dot-separated path. Unrestricted and reactive.
    pub fn read(&self, path: &str) -> Result<Value, StoreError> {
        self.state.get_path(path)
    }

    /// Get a read-only handle on the leaf cell at a path, e.g. to
    /// subscribe to just that field.
    pub fn read_ref(&self, path: &str) -> Result<ReadOnlyRef<Value>, StoreError> {
        match self.state.resolve(path)? {
            Node::Leaf(cell) => Ok(ReadOnlyRef::new(cell)),
            _ => Err(StoreError::NotALeaf(path.to_string())),
        }
    }

    /// Get a read-only view of a nested map. Nested views expose reads
    /// only; actions stay with the view they were registered on.
    pub fn subview(&self, path: &str) -> Result<ReadOnlyView, StoreError> {
        match self.state.resolve(path)? {
            Node::Map(map) => Ok(ReadOnlyView::new(map, ActionRegistry::new())),
            Node::List(_) => Err(StoreError::NotAnObject("array")),
            Node::Leaf(_) => Err(StoreError::NotAContainer(path.to_string())),
        }
    }

    /// Execute a registered action by name.
    ///
    /// The action runs with write access to the underlying map; its result
    /// or error propagates to the caller. An unregistered name is a fault.
    pub fn perform(&self, name: &str, args: &[Value]) -> Result<Value, StoreError> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| StoreError::UnknownAction(name.to_string()))?;
        tracing::debug!(action = name, "performing action");
        action(&self.state, args)
    }

    /// Names of the registered actions, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.names()
    }

    /// Snapshot the viewed state as a plain JSON object.
    pub fn to_value(&self) -> Value {
        self.state.to_value()
    }
}

impl std::fmt::Debug for ReadOnlyView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyView")
            .field("actions", &self.actions.names())
            .finish()
    }
}
