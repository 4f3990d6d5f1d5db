//! Reactive Primitives
//!
//! This module implements the dependency-tracking and notification engine:
//! reactive cells, tracked functions and the tracking context that links
//! them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Ref`] is a container for mutable state. When its value is read
//! inside a tracked function, the cell automatically registers that
//! function as a dependent. When the value changes, all direct subscribers
//! are called and all dependents are re-invoked, synchronously and
//! immediately (there is no batching or scheduling layer).
//!
//! ## Tracked functions
//!
//! An [`Effect`] (or [`AsyncEffect`]) wraps a function so that each
//! invocation records exactly the cells the body read on that run. The
//! dependency set is cleared and rebuilt per run, so dependencies follow
//! the branches the body actually takes.
//!
//! ## Tracking context
//!
//! The context is a per-branch stack of the currently running tracked
//! functions: per OS thread for synchronous code and per tokio task for
//! asynchronous code, so concurrent executions never observe each other's
//! tracking state.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by Vue 3, SolidJS and Leptos.

mod cell;
mod context;
mod dependents;
mod effect;

pub use cell::{Ref, SubscriptionId};
pub use context::is_tracking;
pub use dependents::EffectId;
pub use effect::{AsyncEffect, Effect};
