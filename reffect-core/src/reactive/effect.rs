//! Tracked Functions (effects)
//!
//! An effect wraps a zero-argument function so that every invocation
//! records which cells the body reads. When any of those cells changes,
//! the effect is re-invoked automatically.
//!
//! # How effects work
//!
//! 1. `invoke` first clears the dependency registrations left by the
//!    previous run, then pushes the effect onto the tracking context.
//!
//! 2. While the body runs, every [`Ref::get`](super::Ref::get) registers
//!    the effect as a dependent of that cell and records the cell as one of
//!    the effect's sources.
//!
//! 3. The dependency set is therefore rebuilt from scratch on every run:
//!    it may shrink or grow depending on which branches the body took.
//!
//! # Sync vs async
//!
//! [`Effect`] wraps a synchronous body; a dependency change re-runs it
//! inline on the writing thread. [`AsyncEffect`] wraps an async body; a
//! dependency change spawns the re-run on the current tokio runtime and
//! does not wait for it. A burst of writes can therefore leave several
//! re-runs of the same async effect in flight at once; the engine does not
//! serialize or cancel them.
//!
//! # Stopping
//!
//! `stop()` removes the effect from every cell's dependent table and
//! suppresses future re-invocations. An explicit `invoke` on a stopped
//! effect still runs the body once, without tracking.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::{self, TrackScope, TrackerHandle};
use super::dependents::{Dependents, EffectId};

type RerunFn = Box<dyn Fn(&Arc<EffectCore>) + Send + Sync>;

/// Type-erased core shared by [`Effect`] and [`AsyncEffect`].
///
/// Cells hold `Weak` handles to this core in their dependent tables; the
/// core in turn remembers which tables it is registered in, so it can
/// deregister itself before a re-run or on `stop()`.
pub(crate) struct EffectCore {
    id: EffectId,
    name: String,
    stopped: AtomicBool,
    /// Dependent tables this effect joined during its latest run.
    sources: Mutex<SmallVec<[Weak<Dependents>; 4]>>,
    /// Re-invocation thunk: runs the body tracked (sync) or spawns it
    /// (async), discarding the result.
    rerun: RerunFn,
}

impl EffectCore {
    fn new(name: String, rerun: RerunFn) -> Arc<Self> {
        Arc::new(Self {
            id: EffectId::next(),
            name,
            stopped: AtomicBool::new(false),
            sources: Mutex::new(SmallVec::new()),
            rerun,
        })
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn handle(self: &Arc<Self>) -> TrackerHandle {
        TrackerHandle {
            id: self.id,
            core: Arc::downgrade(self),
        }
    }

    /// Record that this effect registered itself in a cell's dependent
    /// table. Recording the same table twice within one run is a no-op.
    pub(crate) fn record_source(&self, dependents: &Arc<Dependents>) {
        let weak = Arc::downgrade(dependents);
        let mut sources = self.sources.lock();
        if !sources.iter().any(|existing| existing.ptr_eq(&weak)) {
            sources.push(weak);
        }
    }

    /// Deregister from every dependent table joined in the previous run.
    fn clear_sources(&self) {
        let drained = std::mem::take(&mut *self.sources.lock());
        for weak in drained {
            if let Some(dependents) = weak.upgrade() {
                dependents.remove(self.id);
            }
        }
    }

    /// Re-invoke the effect because a dependency changed.
    pub(crate) fn fire(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        tracing::debug!(effect = %self.name, "re-running dependent effect");
        (self.rerun)(self);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.clear_sources();
            tracing::debug!(effect = %self.name, "effect stopped");
        }
    }
}

/// Run a synchronous body with dependency tracking: clear the previous
/// registrations, then rebuild them from the reads the body performs.
fn run_tracked<R>(core: &Arc<EffectCore>, body: impl FnOnce() -> R) -> R {
    core.clear_sources();
    let _scope = TrackScope::enter(core.handle());
    body()
}

/// Async counterpart of [`run_tracked`]; the tracking scope follows the
/// future across suspension points.
async fn run_tracked_async<R>(core: Arc<EffectCore>, fut: impl Future<Output = R>) -> R {
    core.clear_sources();
    context::scope(core.handle(), fut).await
}

/// A synchronous tracked function.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let count_reader = count.clone();
/// let logger = Effect::new(move || {
///     println!("count is {}", count_reader.get());
/// });
///
/// logger.invoke();  // prints "count is 0", establishes the dependency
/// count.set(5);     // prints "count is 5" automatically
/// ```
pub struct Effect<R> {
    core: Arc<EffectCore>,
    body: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R: 'static> Effect<R> {
    /// Wrap a synchronous function. The body does not run until the first
    /// `invoke`.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self::named("effect", body)
    }

    /// Wrap a synchronous function under an explicit name. The stored name
    /// carries a `_sync` suffix.
    pub fn named<F>(name: &str, body: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        let body: Arc<dyn Fn() -> R + Send + Sync> = Arc::new(body);
        let rerun_body = Arc::clone(&body);
        let rerun: RerunFn = Box::new(move |core| {
            run_tracked(core, || {
                rerun_body();
            });
        });
        Self {
            core: EffectCore::new(format!("{name}_sync"), rerun),
            body,
        }
    }

    /// Run the body and return its result.
    ///
    /// If the effect is active, the run rebuilds the dependency set from
    /// the reads it performs. If the effect has been stopped, the body runs
    /// once without tracking.
    pub fn invoke(&self) -> R {
        if self.core.is_stopped() {
            return (self.body)();
        }
        run_tracked(&self.core, || (self.body)())
    }

    /// Detach the effect: it is removed from every cell's dependent table
    /// and never re-fires. Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.core.is_stopped()
    }

    /// The effect's name, suffixed `_sync`.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub(crate) fn core(&self) -> &Arc<EffectCore> {
        &self.core
    }
}

impl<R> Clone for Effect<R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            body: Arc::clone(&self.body),
        }
    }
}

impl<R> std::fmt::Debug for Effect<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.core.id().raw())
            .field("name", &self.core.name())
            .field("stopped", &self.core.is_stopped())
            .finish()
    }
}

type BoxedAsyncBody<R> =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = R> + Send>> + Send + Sync>;

/// An asynchronously-suspending tracked function.
///
/// Reads performed anywhere in the body, including after an `.await`,
/// register dependencies: the tracking scope is carried by the task, not
/// the thread. Dependency-triggered re-runs are spawned fire-and-forget on
/// the current tokio runtime; a writer outside any runtime cannot schedule
/// the re-run, which is reported as an error and dropped.
pub struct AsyncEffect<R> {
    core: Arc<EffectCore>,
    body: BoxedAsyncBody<R>,
}

impl<R: Send + 'static> AsyncEffect<R> {
    /// Wrap an async function. The body does not run until the first
    /// `invoke`.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        Self::named("effect", body)
    }

    /// Wrap an async function under an explicit name. The stored name
    /// carries an `_async` suffix.
    pub fn named<F, Fut>(name: &str, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let body: BoxedAsyncBody<R> = Arc::new(move || {
            let fut: Pin<Box<dyn Future<Output = R> + Send>> = Box::pin(body());
            fut
        });
        let rerun_body = Arc::clone(&body);
        let rerun: RerunFn = Box::new(move |core| {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let core = Arc::clone(core);
                    let fut = rerun_body();
                    runtime.spawn(async move {
                        run_tracked_async(core, fut).await;
                    });
                }
                Err(_) => {
                    tracing::error!(
                        effect = %core.name(),
                        "cannot schedule async effect re-run outside a tokio runtime"
                    );
                }
            }
        });
        Self {
            core: EffectCore::new(format!("{name}_async"), rerun),
            body,
        }
    }

    /// Run the body to completion and return its result.
    ///
    /// Tracking covers the whole execution, across every suspension point.
    /// If the effect has been stopped, the body runs once without tracking.
    pub async fn invoke(&self) -> R {
        if self.core.is_stopped() {
            return (self.body)().await;
        }
        run_tracked_async(Arc::clone(&self.core), (self.body)()).await
    }

    /// Detach the effect. Future re-invocations are suppressed; a re-run
    /// already spawned runs to completion. Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.core.is_stopped()
    }

    /// The effect's name, suffixed `_async`.
    pub fn name(&self) -> &str {
        self.core.name()
    }
}

impl<R> Clone for AsyncEffect<R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            body: Arc::clone(&self.body),
        }
    }
}

impl<R> std::fmt::Debug for AsyncEffect<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEffect")
            .field("id", &self.core.id().raw())
            .field("name", &self.core.name())
            .field("stopped", &self.core.is_stopped())
            .finish()
    }
}
