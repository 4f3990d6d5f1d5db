//! Derived reactive structures.
//!
//! Built on the primitives in [`reactive`](crate::reactive):
//!
//! - [`ReactiveMap`] / [`ReactiveList`]: containers with one cell per
//!   entry, wrapped recursively so deeply nested fields notify their own
//!   readers and nobody else.
//! - [`ReadOnlyView`] + [`ActionRegistry`]: a read-only projection whose
//!   only write path is a closed set of named actions.
//! - [`ReadOnlyRef`]: a read-only handle on a single cell.

mod map;
mod view;

pub use map::{Node, ReactiveList, ReactiveMap};
pub use view::{ActionRegistry, ReadOnlyRef, ReadOnlyView};
