//! Effect Implementation
//!
//! An Effect wraps a computation so that the slots it reads are recorded and
//! its re-execution can be triggered when any of them change.
//!
//! # How Effects Work
//!
//! 1. Running an effect makes it the current effect in the
//!    [`ReactiveContext`]; every tracked read subscribes it to a [`Dep`].
//!
//! 2. When a subscribed slot changes, the effect's scheduler is invoked if it
//!    has one, otherwise the effect re-runs synchronously.
//!
//! 3. Before re-running, the effect leaves every dependency set it joined,
//!    so a branch that stopped reading a slot no longer subscribes to it.
//!
//! 4. Stopping an effect unsubscribes it for good. A stopped effect can still
//!    be run, but it no longer tracks anything.
//!
//! # Ownership
//!
//! Dependency sets only hold weak references. Whoever owns the
//! [`EffectRunner`] (a component, a computed, a watcher) keeps the effect
//! alive; dropping the last handle removes it from every set it joined.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::context::ReactiveContext;
use super::dep::Dep;
use crate::value::Value;

/// The wrapped computation of an effect.
pub type EffectFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Replacement for an effect's default synchronous re-run.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

type OnStop = Box<dyn FnOnce() + Send>;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct EffectInner {
    id: EffectId,
    func: EffectFn,
    scheduler: Option<Scheduler>,
    active: AtomicBool,
    /// Dependency sets this effect is subscribed to.
    deps: Mutex<SmallVec<[Dep; 4]>>,
    on_stop: Mutex<Option<OnStop>>,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in deps {
            dep.remove(self.id);
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A trackable computation.
#[derive(Clone)]
pub struct ReactiveEffect(Arc<EffectInner>);

impl ReactiveEffect {
    /// Create an effect without running it.
    pub fn new(func: EffectFn, scheduler: Option<Scheduler>) -> Self {
        Self(Arc::new(EffectInner {
            id: EffectId::new(),
            func,
            scheduler,
            active: AtomicBool::new(true),
            deps: Mutex::new(SmallVec::new()),
            on_stop: Mutex::new(None),
            run_count: AtomicUsize::new(0),
        }))
    }

    pub fn id(&self) -> EffectId {
        self.0.id
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.0.scheduler.as_ref()
    }

    pub(crate) fn func(&self) -> &EffectFn {
        &self.0.func
    }

    /// Register the cleanup hook invoked by [`stop`](Self::stop).
    pub fn set_on_stop<F>(&self, on_stop: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.0.on_stop.lock() = Some(Box::new(on_stop));
    }

    /// Run the computation, collecting its dependencies.
    ///
    /// A stopped effect runs its computation without tracking. An effect that
    /// is already running further up the stack is not re-entered and yields
    /// `Undefined`.
    pub fn run(&self) -> Value {
        if !self.is_active() {
            return (self.0.func)();
        }
        if ReactiveContext::contains(self.id()) {
            return Value::Undefined;
        }

        self.0.cleanup();
        let _ctx = ReactiveContext::enter(self);
        self.0.run_count.fetch_add(1, Ordering::Relaxed);
        (self.0.func)()
    }

    /// Permanently deactivate the effect.
    pub fn stop(&self) {
        if !self.0.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.0.cleanup();
        let on_stop = self.0.on_stop.lock().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
        debug!(effect = ?self.id(), "effect stopped");
    }

    /// Called when one of the effect's dependencies changed.
    pub(crate) fn notify(&self) {
        match &self.0.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }

    /// Record the symmetric side of a subscription.
    pub(crate) fn push_dep(&self, dep: Dep) {
        self.0.deps.lock().push(dep);
    }

    /// Number of dependency sets the effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.lock().len()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.0.run_count.load(Ordering::Relaxed)
    }

    pub fn ptr_eq(&self, other: &ReactiveEffect) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<EffectInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<EffectInner>) -> Option<Self> {
        weak.upgrade().map(Self)
    }
}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Options accepted by [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run the effect on creation.
    pub lazy: bool,
    pub scheduler: Option<Scheduler>,
    pub on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Callable handle returned by [`effect`].
///
/// Dropping the runner drops the effect.
#[must_use = "dropping the runner drops the effect"]
#[derive(Clone, Debug)]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    /// Run the computation now, returning its result.
    pub fn run(&self) -> Value {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }

    pub fn stop(&self) {
        self.effect.stop();
    }

    /// A new, independent effect over the same computation.
    pub fn with_options(&self, options: EffectOptions) -> EffectRunner {
        create_runner(self.effect.func().clone(), options)
    }
}

fn create_runner(func: EffectFn, options: EffectOptions) -> EffectRunner {
    let effect = ReactiveEffect::new(func, options.scheduler);
    if let Some(on_stop) = options.on_stop {
        effect.set_on_stop(on_stop);
    }
    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}

/// Create an effect and run it immediately.
pub fn effect<F, R>(f: F) -> EffectRunner
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    effect_with(f, EffectOptions::default())
}

pub fn effect_with<F, R>(f: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    create_runner(Arc::new(move || f().into()), options)
}

/// Stop the effect behind `runner`.
pub fn stop(runner: &EffectRunner) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
