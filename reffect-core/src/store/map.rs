//! Reactive Map and List
//!
//! [`ReactiveMap`] is a mapping built from one reactive cell per entry.
//! Values are `serde_json::Value`s; map- and list-shaped values are
//! recursively wrapped at assignment time, so a field three levels deep
//! has its own cell and mutating it notifies only the tracked functions
//! that read that field, never the whole top-level mapping.
//!
//! Structural changes (insert, remove, push) bump a per-container version
//! cell, which is what `len()`, `keys()`, `contains_key()` and the
//! snapshot accessors read. A tracked function that iterates a map
//! therefore re-runs when the key set changes, without depending on every
//! leaf.
//!
//! Replacing an entry wholesale (a leaf overwritten with a container, or a
//! whole subtree swapped out) retires the old cells through their normal
//! set path, so readers of the old value still observe the replacement and
//! re-attach to the new cells on their next run.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::StoreError;
use crate::reactive::Ref;

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_index(segment: &str, len: usize) -> Result<usize, StoreError> {
    let index: usize = segment
        .parse()
        .map_err(|_| StoreError::InvalidIndex(segment.to_string()))?;
    if index >= len {
        return Err(StoreError::IndexOutOfBounds { index, len });
    }
    Ok(index)
}

/// One entry of a reactive container: a scalar leaf cell, a nested map or
/// a nested list. The variant is decided by the shape of the value at the
/// point it is assigned.
#[derive(Clone)]
pub enum Node {
    Leaf(Ref<Value>),
    Map(ReactiveMap),
    List(ReactiveList),
}

impl Node {
    pub(crate) fn wrap(value: Value) -> Node {
        match value {
            Value::Object(fields) => Node::Map(ReactiveMap::from_object(fields)),
            Value::Array(items) => Node::List(ReactiveList::from_items(items)),
            scalar => Node::Leaf(Ref::new(scalar)),
        }
    }

    /// Notify the observers of a node that has just been replaced in its
    /// parent container. Each old leaf receives the corresponding value
    /// from the replacement (`Null` where the replacement has none)
    /// through its normal equality-gated set, and each old container bumps
    /// its version, so readers of the old entry re-run and re-attach to
    /// the new cells.
    fn retire(&self, replacement: &Value) {
        match self {
            Node::Leaf(cell) => cell.set(replacement.clone()),
            Node::Map(map) => map.retire(replacement),
            Node::List(list) => list.retire(replacement),
        }
    }

    /// Snapshot this node as a plain value. Leaf reads are tracked, so a
    /// tracked function that snapshots a subtree depends on every leaf in
    /// it, and on each container's structure version.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(cell) => cell.get(),
            Node::Map(map) => map.to_value(),
            Node::List(list) => list.to_value(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Leaf(cell) => f.debug_tuple("Leaf").field(cell).finish(),
            Node::Map(_) => f.write_str("Map(..)"),
            Node::List(_) => f.write_str("List(..)"),
        }
    }
}

/// A reactive mapping from string keys to wrapped values.
///
/// Key insertion order is preserved. Cloning shares state.
#[derive(Clone)]
pub struct ReactiveMap {
    entries: Arc<RwLock<IndexMap<String, Node>>>,
    /// Bumped on insert and remove; read by the structural accessors.
    version: Ref<u64>,
}

impl Default for ReactiveMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
            version: Ref::new(0),
        }
    }

    /// Wrap an existing JSON object, recursing into nested objects and
    /// arrays.
    pub fn from_object(fields: serde_json::Map<String, Value>) -> Self {
        let entries = fields
            .into_iter()
            .map(|(key, value)| (key, Node::wrap(value)))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
            version: Ref::new(0),
        }
    }

    /// Wrap a JSON value that must be an object.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(fields) => Ok(Self::from_object(fields)),
            other => Err(StoreError::NotAnObject(kind_name(&other))),
        }
    }

    /// Read an entry as a plain value. Leaf entries register a dependency
    /// on exactly that entry's cell; container entries snapshot their
    /// leaves with tracked reads.
    ///
    /// Reading a key that is absent (or was removed) is a fault.
    pub fn get(&self, key: &str) -> Result<Value, StoreError> {
        Ok(self.entry(key)?.to_value())
    }

    /// Get the entry's node handle without reading any leaf.
    pub fn entry(&self, key: &str) -> Result<Node, StoreError> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Get the leaf cell behind a key, e.g. to subscribe to it directly.
    pub fn cell(&self, key: &str) -> Result<Ref<Value>, StoreError> {
        match self.entry(key)? {
            Node::Leaf(cell) => Ok(cell),
            _ => Err(StoreError::NotALeaf(key.to_string())),
        }
    }

    /// Get a nested map handle.
    pub fn map(&self, key: &str) -> Result<ReactiveMap, StoreError> {
        match self.entry(key)? {
            Node::Map(map) => Ok(map),
            _ => Err(StoreError::NotAContainer(key.to_string())),
        }
    }

    /// Get a nested list handle.
    pub fn list(&self, key: &str) -> Result<ReactiveList, StoreError> {
        match self.entry(key)? {
            Node::List(list) => Ok(list),
            _ => Err(StoreError::NotAContainer(key.to_string())),
        }
    }

    /// Assign a value to a key.
    ///
    /// A scalar written over an existing leaf goes through the cell's
    /// equality-gated `set`, so writing an equal value notifies nobody.
    /// Everything else (new key, shape change, container value) re-wraps
    /// the value eagerly, bumps the structure version and retires the
    /// replaced entry's cells, so readers of the old value observe the
    /// replacement.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !matches!(value, Value::Object(_) | Value::Array(_)) {
            let existing = self.entries.read().get(key).cloned();
            if let Some(Node::Leaf(cell)) = existing {
                cell.set(value);
                return;
            }
        }
        let replaced = self
            .entries
            .write()
            .insert(key.to_string(), Node::wrap(value.clone()));
        self.bump();
        if let Some(old) = replaced {
            old.retire(&value);
        }
    }

    /// Remove an entry. Removing an absent key is a fault, and so is any
    /// later read of the removed key.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.entries.write().shift_remove(key);
        match removed {
            Some(_) => {
                self.bump();
                Ok(())
            }
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    /// Whether the key is present. Tracked via the structure version.
    pub fn contains_key(&self, key: &str) -> bool {
        self.version.get();
        self.entries.read().contains_key(key)
    }

    /// Number of entries. Tracked via the structure version.
    pub fn len(&self) -> usize {
        self.version.get();
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys in insertion order. Tracked via the structure version.
    pub fn keys(&self) -> Vec<String> {
        self.version.get();
        self.entries.read().keys().cloned().collect()
    }

    /// Snapshot the whole map as a plain JSON object. Leaf reads are
    /// tracked, and so is the structure version, so a tracked reader of a
    /// snapshot re-runs on insert and remove as well as on leaf writes.
    pub fn to_value(&self) -> Value {
        self.version.get();
        let snapshot: Vec<(String, Node)> = self
            .entries
            .read()
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        Value::Object(
            snapshot
                .into_iter()
                .map(|(key, node)| (key, node.to_value()))
                .collect(),
        )
    }

    /// Read the value at a dot-separated path, e.g. `"user.roles.0"`.
    pub fn get_path(&self, path: &str) -> Result<Value, StoreError> {
        Ok(self.resolve(path)?.to_value())
    }

    /// Assign a value at a dot-separated path. Every segment but the last
    /// must already exist and be a container.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = value.into();
        match path.rsplit_once('.') {
            None => {
                self.set(path, value);
                Ok(())
            }
            Some((parent, last)) => match self.resolve(parent)? {
                Node::Map(map) => {
                    map.set(last, value);
                    Ok(())
                }
                Node::List(list) => {
                    let index = parse_index(last, list.len_untracked())?;
                    list.set(index, value)
                }
                Node::Leaf(_) => Err(StoreError::NotAContainer(parent.to_string())),
            },
        }
    }

    /// Walk a dot-separated path down to a node handle. No leaf is read.
    pub(crate) fn resolve(&self, path: &str) -> Result<Node, StoreError> {
        let mut node = Node::Map(self.clone());
        for segment in path.split('.') {
            node = match node {
                Node::Map(map) => map.entry(segment)?,
                Node::List(list) => {
                    let index = parse_index(segment, list.len_untracked())?;
                    list.entry(index)?
                }
                Node::Leaf(_) => {
                    return Err(StoreError::NotAContainer(segment.to_string()));
                }
            };
        }
        Ok(node)
    }

    /// Retire every entry against the value that replaced this map, then
    /// bump the version so structural readers re-run too.
    fn retire(&self, replacement: &Value) {
        let snapshot: Vec<(String, Node)> = self
            .entries
            .read()
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        for (key, node) in snapshot {
            let next = match replacement {
                Value::Object(fields) => fields.get(&key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
            node.retire(&next);
        }
        self.bump();
    }

    fn bump(&self) {
        self.version.update(|v| v + 1);
    }
}

impl std::fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

/// A reactive sequence with one cell per scalar item.
///
/// Cloning shares state.
#[derive(Clone)]
pub struct ReactiveList {
    items: Arc<RwLock<Vec<Node>>>,
    /// Bumped on push and structural replacement.
    version: Ref<u64>,
}

impl ReactiveList {
    pub(crate) fn from_items(items: Vec<Value>) -> Self {
        let items = items.into_iter().map(Node::wrap).collect();
        Self {
            items: Arc::new(RwLock::new(items)),
            version: Ref::new(0),
        }
    }

    /// Read the item at `index` as a plain value, tracked like
    /// [`ReactiveMap::get`].
    pub fn get(&self, index: usize) -> Result<Value, StoreError> {
        Ok(self.entry(index)?.to_value())
    }

    /// Get the item's node handle without reading any leaf.
    pub fn entry(&self, index: usize) -> Result<Node, StoreError> {
        let items = self.items.read();
        items
            .get(index)
            .cloned()
            .ok_or(StoreError::IndexOutOfBounds {
                index,
                len: items.len(),
            })
    }

    /// Assign a value at an existing index, with the same scalar fast path
    /// and eager re-wrap rules as [`ReactiveMap::set`].
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = value.into();
        if !matches!(value, Value::Object(_) | Value::Array(_)) {
            if let Node::Leaf(cell) = self.entry(index)? {
                cell.set(value);
                return Ok(());
            }
        }
        let replaced = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(StoreError::IndexOutOfBounds { index, len })?;
            std::mem::replace(slot, Node::wrap(value.clone()))
        };
        self.bump();
        replaced.retire(&value);
        Ok(())
    }

    /// Append a value, wrapping it eagerly.
    pub fn push(&self, value: impl Into<Value>) {
        let node = Node::wrap(value.into());
        self.items.write().push(node);
        self.bump();
    }

    /// Number of items. Tracked via the structure version.
    pub fn len(&self) -> usize {
        self.version.get();
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.items.read().len()
    }

    /// Snapshot the whole list as a plain JSON array. Leaf reads are
    /// tracked, and so is the structure version.
    pub fn to_value(&self) -> Value {
        self.version.get();
        let snapshot: Vec<Node> = self.items.read().clone();
        Value::Array(snapshot.into_iter().map(|node| node.to_value()).collect())
    }

    /// List counterpart of [`ReactiveMap::retire`].
    fn retire(&self, replacement: &Value) {
        let snapshot: Vec<Node> = self.items.read().clone();
        for (index, node) in snapshot.into_iter().enumerate() {
            let next = match replacement {
                Value::Array(items) => items.get(index).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
            node.retire(&next);
        }
        self.bump();
    }

    fn bump(&self) {
        self.version.update(|v| v + 1);
    }
}

impl std::fmt::Debug for ReactiveList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveList")
            .field("len", &self.items.read().len())
            .finish()
    }
}
