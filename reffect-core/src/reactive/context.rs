//! Tracking Context
//!
//! The tracking context records which tracked function is currently
//! executing. This enables automatic dependency tracking: when a cell is
//! read, the engine registers the current tracked function as a dependent.
//!
//! # Branch isolation
//!
//! There is one stack per concurrent execution branch, never shared:
//!
//! - Synchronous call chains isolate by OS thread, via a `thread_local!`
//!   stack.
//! - Asynchronously-suspending call chains isolate by logical task, via a
//!   `tokio::task_local!` stack. The stack travels with the task, so a
//!   future that suspends and resumes on a different worker thread keeps
//!   its tracking state.
//!
//! A synchronous push made while a task-local scope is active on the
//! current task lands on the task stack, so sync-inside-async nests
//! correctly.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Weak;

use super::dependents::EffectId;
use super::effect::EffectCore;

thread_local! {
    static THREAD_STACK: RefCell<Vec<TrackerHandle>> = RefCell::new(Vec::new());
}

tokio::task_local! {
    /// Task-local tracking stack. Follows the task across thread
    /// boundaries in work-stealing async runtimes.
    static TASK_STACK: RefCell<Vec<TrackerHandle>>;
}

/// Non-owning handle to the tracked function on top of a stack.
#[derive(Clone)]
pub(crate) struct TrackerHandle {
    pub id: EffectId,
    pub core: Weak<EffectCore>,
}

/// Get the tracked function currently executing on this branch, if any.
///
/// The task stack takes precedence: code running inside an async effect
/// sees that effect even when nothing on the current thread's stack is
/// active.
pub(crate) fn current() -> Option<TrackerHandle> {
    let from_task = TASK_STACK
        .try_with(|stack| stack.borrow().last().cloned())
        .ok()
        .flatten();
    if from_task.is_some() {
        return from_task;
    }
    THREAD_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Check whether any tracked function is executing on this branch.
pub fn is_tracking() -> bool {
    current().is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Task,
    Thread,
}

/// Guard that pops the tracking stack when dropped.
///
/// Push and pop are strictly paired around one execution; the guard keeps
/// the stack consistent even if the tracked body panics. Popping an entry
/// other than the one this guard pushed is a programming error and panics.
pub(crate) struct TrackScope {
    id: EffectId,
    branch: Branch,
}

impl TrackScope {
    /// Push the given handle onto the active branch's stack.
    pub fn enter(handle: TrackerHandle) -> Self {
        let id = handle.id;
        let pushed_to_task = TASK_STACK
            .try_with(|stack| stack.borrow_mut().push(handle.clone()))
            .is_ok();
        let branch = if pushed_to_task {
            Branch::Task
        } else {
            THREAD_STACK.with(|stack| stack.borrow_mut().push(handle));
            Branch::Thread
        };
        Self { id, branch }
    }
}

impl Drop for TrackScope {
    fn drop(&mut self) {
        let popped = match self.branch {
            Branch::Task => TASK_STACK
                .try_with(|stack| stack.borrow_mut().pop())
                .ok()
                .flatten(),
            Branch::Thread => THREAD_STACK.with(|stack| stack.borrow_mut().pop()),
        };
        match popped {
            Some(entry) if entry.id == self.id => {}
            other => panic!(
                "tracking stack corrupted: expected to pop effect {:?}, found {:?}",
                self.id,
                other.map(|handle| handle.id)
            ),
        }
    }
}

/// Run a future with the given handle on the task-local stack.
///
/// If the current task already has a stack (nested tracked execution), the
/// handle is pushed onto it; otherwise a fresh stack is scoped around the
/// future, which is what lets `tokio::spawn`-ed re-invocations track their
/// own dependencies.
pub(crate) async fn scope<R>(handle: TrackerHandle, fut: impl Future<Output = R>) -> R {
    if TASK_STACK.try_with(|_| ()).is_ok() {
        let _scope = TrackScope::enter(handle);
        fut.await
    } else {
        TASK_STACK.scope(RefCell::new(vec![handle]), fut).await
    }
}
