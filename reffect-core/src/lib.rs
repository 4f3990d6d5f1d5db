//! Reffect Core
//!
//! This crate provides the core of the Reffect reactive-state runtime:
//! a dependency-tracking and notification engine in which reading a value
//! inside a tracked function automatically registers that function as a
//! dependent, and every later change to the value re-invokes it.
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - `reactive`: the engine primitives — [`Ref`](reactive::Ref) cells,
//!   [`Effect`](reactive::Effect)/[`AsyncEffect`](reactive::AsyncEffect)
//!   tracked functions, and the per-thread/per-task tracking context
//! - `store`: structures built on top — [`ReactiveMap`](store::ReactiveMap)
//!   with fine-grained nested reactivity, and
//!   [`ReadOnlyView`](store::ReadOnlyView) with named actions
//! - `error`: the [`StoreError`](error::StoreError) fault taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use reffect_core::reactive::{Effect, Ref};
//!
//! let count = Ref::new(0);
//!
//! let count_reader = count.clone();
//! let printer = Effect::new(move || {
//!     println!("count: {}", count_reader.get());
//! });
//!
//! printer.invoke();  // prints "count: 0"
//! count.set(5);      // prints "count: 5" automatically
//! ```
//!
//! Notifications are synchronous and immediate: there is no batching,
//! scheduling or cycle detection. See the module docs for the documented
//! concurrency hazards.

pub mod error;
pub mod reactive;
pub mod store;
