//! Error types for the store layer.
//!
//! Protocol misuse (reading a removed key, performing an unregistered
//! action, traversing a scalar as if it were a container) surfaces as a
//! [`StoreError`]. Engine-internal invariant violations, such as a
//! mismatched tracking-stack pop, are programming errors and panic instead.

use thiserror::Error;

/// Faults raised by [`ReactiveMap`](crate::store::ReactiveMap),
/// [`ReactiveList`](crate::store::ReactiveList) and
/// [`ReadOnlyView`](crate::store::ReadOnlyView) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not present in the map (never was, or was removed).
    #[error("key `{0}` not found")]
    KeyNotFound(String),

    /// The list index is past the end of the list.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A path segment addressed a list but did not parse as an index.
    #[error("path segment `{0}` is not a valid list index")]
    InvalidIndex(String),

    /// A path tried to descend through a scalar value.
    #[error("path segment `{0}` does not refer to a container")]
    NotAContainer(String),

    /// The path resolved to a container where a leaf was required.
    #[error("path `{0}` does not refer to a leaf value")]
    NotALeaf(String),

    /// A map was constructed from a value that is not an object.
    #[error("expected an object value, found {0}")]
    NotAnObject(&'static str),

    /// `perform` was called with a name that was never registered.
    #[error("unknown action `{0}`")]
    UnknownAction(String),

    /// An action rejected the arguments it was invoked with.
    #[error("action `{name}` rejected arguments: {reason}")]
    InvalidArguments { name: String, reason: String },
}
