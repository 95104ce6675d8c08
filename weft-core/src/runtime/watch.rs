//! Watchers
//!
//! A watcher runs a callback when a watched source changes. Sources are
//! refs (including computeds), reactive proxies, getter functions, or a list
//! of those.
//!
//! # How Watchers Work
//!
//! 1. The source is normalized into a getter, which runs inside an internal
//!    effect. A reactive proxy source is watched deeply: the getter traverses
//!    the whole structure so a write anywhere inside it is observed.
//!
//! 2. When a dependency changes, the effect's scheduler queues the watcher's
//!    job instead of running it, so synchronous writes within one tick are
//!    batched into a single callback. [`FlushMode::Sync`] runs it at once.
//!
//! 3. The job re-runs the getter and calls the callback with the new and old
//!    value when they differ. Deep and forced watchers always call back.
//!
//! 4. The callback can register a cleanup through [`OnInvalidate`]; it runs
//!    before the next callback and when the watcher stops.
//!
//! Watchers are owned by their [`WatchHandle`]. A job queued for a watcher
//! that has since been stopped or dropped does nothing.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::scheduler::{queue_post_flush_cb, queue_pre_flush_cb, SchedulerJob};
use super::traverse::traverse;
use crate::reactive::{is_reactive, Computed, EffectFn, Proxy, ReactiveEffect, Ref, Scheduler};
use crate::value::{has_changed, Value};

/// When a triggered watcher runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Batched, before the main jobs of the next flush.
    #[default]
    Pre,
    /// Batched, after the main jobs of the next flush.
    Post,
    /// Immediately, inside the write that triggered it.
    Sync,
}

/// Options accepted by [`watch`] and [`watch_effect_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Run the callback once on creation.
    pub immediate: bool,
    /// Observe every nested slot of the source.
    pub deep: bool,
    pub flush: FlushMode,
}

/// A zero-argument getter source.
pub type WatchGetter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Something a watcher can observe.
#[derive(Clone)]
pub enum WatchSource {
    Ref(Ref),
    Reactive(Proxy),
    Getter(WatchGetter),
    Many(Vec<WatchSource>),
    /// Not watchable. Kept so the watcher can still be created and stopped.
    Invalid(Value),
}

impl WatchSource {
    pub fn getter<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        WatchSource::Getter(Arc::new(move || f().into()))
    }

    fn is_reactive(&self) -> bool {
        matches!(self, WatchSource::Reactive(_))
    }

    /// Getter for one element of a multi-source watch.
    fn element_getter(self) -> WatchGetter {
        match self {
            WatchSource::Ref(r) => Arc::new(move || r.value()),
            WatchSource::Reactive(proxy) => Arc::new(move || traverse(Value::Proxy(proxy.clone()))),
            WatchSource::Getter(getter) => getter,
            WatchSource::Many(_) | WatchSource::Invalid(_) => {
                warn_invalid_source(&self);
                Arc::new(|| Value::Undefined)
            }
        }
    }
}

fn warn_invalid_source(source: &WatchSource) {
    warn!(
        ?source,
        "invalid watch source: a watch source can only be a getter, a ref, a reactive object, or a list of these"
    );
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            WatchSource::Reactive(proxy) => f.debug_tuple("Reactive").field(proxy).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
            WatchSource::Many(sources) => f.debug_tuple("Many").field(sources).finish(),
            WatchSource::Invalid(value) => f.debug_tuple("Invalid").field(value).finish(),
        }
    }
}

/// Dispatch on the value's shape: ref, then reactive proxy, then function.
impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Ref(r) => WatchSource::Ref(r),
            Value::Proxy(proxy) if is_reactive(&Value::Proxy(proxy.clone())) => {
                WatchSource::Reactive(proxy)
            }
            Value::Function(f) => WatchSource::Getter(Arc::new(move || f.call(&[]))),
            other => WatchSource::Invalid(other),
        }
    }
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&Ref> for WatchSource {
    fn from(r: &Ref) -> Self {
        WatchSource::Ref(r.clone())
    }
}

impl From<Computed> for WatchSource {
    fn from(computed: Computed) -> Self {
        WatchSource::Ref(computed.to_ref())
    }
}

impl From<&Computed> for WatchSource {
    fn from(computed: &Computed) -> Self {
        WatchSource::Ref(computed.to_ref())
    }
}

impl From<Proxy> for WatchSource {
    fn from(proxy: Proxy) -> Self {
        WatchSource::from(Value::Proxy(proxy))
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSource::Many(sources)
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;
type CleanupSlot = Arc<Mutex<Option<Cleanup>>>;

fn run_cleanup(slot: &CleanupSlot) {
    let cleanup = slot.lock().take();
    if let Some(cleanup) = cleanup {
        cleanup();
    }
}

/// Registers the cleanup of a watcher run.
#[derive(Clone)]
pub struct OnInvalidate {
    slot: CleanupSlot,
}

impl OnInvalidate {
    /// Run `cleanup` before the next callback, or when the watcher stops.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(cleanup));
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("registered", &self.slot.lock().is_some())
            .finish()
    }
}

type WatchCallback = Box<dyn Fn(Value, Value, &OnInvalidate) + Send + Sync>;

struct WatchState {
    effect: ReactiveEffect,
    job: SchedulerJob,
    callback: Option<WatchCallback>,
    /// `None` until the first run.
    old_value: Mutex<Option<Value>>,
    on_invalidate: OnInvalidate,
    deep: bool,
    force_trigger: bool,
    multi: bool,
}

impl WatchState {
    fn has_changed(&self, new_value: &Value, old_value: Option<&Value>) -> bool {
        let Some(old_value) = old_value else {
            return true;
        };
        if !self.multi {
            return has_changed(new_value, old_value);
        }
        match (new_value.as_object(), old_value.as_object()) {
            (Some(new_items), Some(old_items)) => {
                let new_items = new_items.items();
                let old_items = old_items.items();
                new_items.len() != old_items.len()
                    || new_items
                        .iter()
                        .zip(&old_items)
                        .any(|(new, old)| has_changed(new, old))
            }
            _ => true,
        }
    }

    fn run_job(&self) {
        if !self.effect.is_active() {
            return;
        }
        let Some(callback) = &self.callback else {
            // watch_effect
            self.effect.run();
            return;
        };

        let new_value = self.effect.run();
        let old_value = self.old_value.lock().clone();
        if self.deep || self.force_trigger || self.has_changed(&new_value, old_value.as_ref()) {
            run_cleanup(&self.on_invalidate.slot);
            callback(
                new_value.clone(),
                old_value.unwrap_or_default(),
                &self.on_invalidate,
            );
            *self.old_value.lock() = Some(new_value);
        }
    }
}

/// Owns a watcher. Dropping the handle stops it.
#[must_use = "dropping the handle stops the watcher"]
pub struct WatchHandle {
    state: Arc<WatchState>,
}

impl WatchHandle {
    /// Stop the watcher and run any registered cleanup.
    pub fn stop(&self) {
        self.state.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.state.effect.is_active()
    }

    /// The internal effect running the getter.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.state.effect
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.state.effect)
            .field("deep", &self.state.deep)
            .finish()
    }
}

fn do_watch(
    source: WatchSource,
    callback: Option<WatchCallback>,
    options: WatchOptions,
    on_invalidate: OnInvalidate,
) -> WatchHandle {
    let WatchOptions {
        immediate,
        mut deep,
        flush,
    } = options;
    let mut force_trigger = false;
    let mut multi = false;

    let getter: WatchGetter = match source {
        WatchSource::Ref(r) => {
            force_trigger = r.is_shallow();
            Arc::new(move || r.value())
        }
        WatchSource::Reactive(proxy) => {
            deep = true;
            let value = Value::Proxy(proxy);
            Arc::new(move || value.clone())
        }
        WatchSource::Many(sources) => {
            multi = true;
            force_trigger = sources.iter().any(WatchSource::is_reactive);
            let getters: Vec<WatchGetter> = sources
                .into_iter()
                .map(WatchSource::element_getter)
                .collect();
            Arc::new(move || Value::array(getters.iter().map(|getter| getter()).collect::<Vec<_>>()))
        }
        WatchSource::Getter(getter) => getter,
        invalid @ WatchSource::Invalid(_) => {
            warn_invalid_source(&invalid);
            Arc::new(|| Value::Undefined)
        }
    };

    let getter: EffectFn = if callback.is_some() && deep {
        Arc::new(move || traverse(getter()))
    } else {
        getter
    };

    let has_callback = callback.is_some();
    let state = Arc::new_cyclic(|weak: &Weak<WatchState>| {
        let weak = weak.clone();
        let job = SchedulerJob::new(move || {
            if let Some(state) = weak.upgrade() {
                state.run_job();
            }
        });

        let scheduled = job.clone();
        let scheduler: Scheduler = match flush {
            FlushMode::Sync => Arc::new(move || scheduled.run()),
            FlushMode::Pre => Arc::new(move || queue_pre_flush_cb(scheduled.clone())),
            FlushMode::Post => Arc::new(move || queue_post_flush_cb(scheduled.clone())),
        };

        let effect = ReactiveEffect::new(getter, Some(scheduler));
        let slot = on_invalidate.slot.clone();
        effect.set_on_stop(move || run_cleanup(&slot));

        WatchState {
            effect,
            job,
            callback,
            old_value: Mutex::new(None),
            on_invalidate,
            deep,
            force_trigger,
            multi,
        }
    });

    if has_callback {
        if immediate {
            state.run_job();
        } else {
            let initial = state.effect.run();
            *state.old_value.lock() = Some(initial);
        }
    } else if flush == FlushMode::Post {
        queue_post_flush_cb(state.job.clone());
    } else {
        state.effect.run();
    }

    debug!(effect = ?state.effect.id(), ?flush, deep, "watcher created");
    WatchHandle { state }
}

/// Call `callback(new, old, on_invalidate)` when `source` changes.
///
/// `old` is `Undefined` on an immediate first call.
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    F: Fn(Value, Value, &OnInvalidate) + Send + Sync + 'static,
{
    do_watch(
        source.into(),
        Some(Box::new(callback)),
        options,
        OnInvalidate {
            slot: Arc::new(Mutex::new(None)),
        },
    )
}

/// Run `f` now and again whenever anything it read changes.
pub fn watch_effect<F>(f: F) -> WatchHandle
where
    F: Fn(&OnInvalidate) + Send + Sync + 'static,
{
    watch_effect_with(f, WatchOptions::default())
}

/// Like [`watch_effect`], with an explicit flush mode. `immediate` and
/// `deep` only apply to [`watch`] and are ignored here.
pub fn watch_effect_with<F>(f: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&OnInvalidate) + Send + Sync + 'static,
{
    if options.immediate || options.deep {
        warn!(
            immediate = options.immediate,
            deep = options.deep,
            "the immediate and deep options are only respected by watch(source, callback, options)"
        );
    }

    let on_invalidate = OnInvalidate {
        slot: Arc::new(Mutex::new(None)),
    };
    let handle = on_invalidate.clone();
    let source = WatchSource::getter(move || {
        run_cleanup(&handle.slot);
        f(&handle);
    });
    do_watch(
        source,
        None,
        WatchOptions {
            flush: options.flush,
            ..WatchOptions::default()
        },
        on_invalidate,
    )
}

/// [`watch_effect`] flushed after the main jobs.
pub fn watch_post_effect<F>(f: F) -> WatchHandle
where
    F: Fn(&OnInvalidate) + Send + Sync + 'static,
{
    watch_effect_with(
        f,
        WatchOptions {
            flush: FlushMode::Post,
            ..WatchOptions::default()
        },
    )
}

/// [`watch_effect`] re-run synchronously on every change.
pub fn watch_sync_effect<F>(f: F) -> WatchHandle
where
    F: Fn(&OnInvalidate) + Send + Sync + 'static,
{
    watch_effect_with(
        f,
        WatchOptions {
            flush: FlushMode::Sync,
            ..WatchOptions::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, reactive, ref_, shallow_ref, trigger_ref};
    use crate::runtime::scheduler::{flush_jobs, has_pending_jobs};
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    type Calls = Arc<Mutex<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl Fn(Value, Value, &OnInvalidate) + Send + Sync + 'static) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        (calls, move |new: Value, old: Value, _: &OnInvalidate| {
            calls_clone.lock().push((new, old));
        })
    }

    #[test]
    fn writes_in_one_tick_are_batched() {
        let count = ref_(0);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default());

        count.set_value(1);
        count.set_value(2);
        assert!(calls.lock().is_empty());

        flush_jobs();
        assert_eq!(*calls.lock(), vec![(Value::from(2), Value::from(0))]);
    }

    #[test]
    fn stop_cancels_a_pending_job() {
        let count = ref_(0);
        let (calls, callback) = recorder();
        let handle = watch(&count, callback, WatchOptions::default());

        count.set_value(1);
        count.set_value(2);
        handle.stop();
        assert!(has_pending_jobs());

        flush_jobs();
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn dropping_the_handle_cancels_a_pending_job() {
        let count = ref_(0);
        let (calls, callback) = recorder();
        let handle = watch(&count, callback, WatchOptions::default());

        count.set_value(1);
        drop(handle);
        flush_jobs();
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn immediate_calls_back_with_undefined_old_value() {
        let count = ref_(5);
        let (calls, callback) = recorder();
        let _handle = watch(
            &count,
            callback,
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );

        assert_eq!(*calls.lock(), vec![(Value::from(5), Value::Undefined)]);
    }

    #[test]
    fn reverting_within_a_tick_does_not_call_back() {
        let count = ref_(0);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default());

        count.set_value(1);
        count.set_value(0);
        flush_jobs();
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn reactive_source_is_watched_deeply() {
        let state = reactive(json!({"nested": {"x": 1}}));
        let proxy = state.as_proxy().expect("proxy").clone();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _handle = watch(
            proxy.clone(),
            move |_, _, _| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        let nested = proxy.get("nested");
        nested.as_proxy().expect("proxy").set("x", 2);
        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deep_getter_watch_sees_nested_writes() {
        let state = reactive(json!({"nested": {"x": 1}}));
        let proxy = state.as_proxy().expect("proxy").clone();
        let runs = Arc::new(AtomicI32::new(0));

        let getter_proxy = proxy.clone();
        let runs_clone = runs.clone();
        let _handle = watch(
            WatchSource::getter(move || getter_proxy.get("nested")),
            move |_, _, _| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                deep: true,
                ..Default::default()
            },
        );

        proxy.get("nested").as_proxy().expect("proxy").set("x", 2);
        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_sources_report_arrays() {
        let a = ref_(1);
        let b = ref_(2);
        let (calls, callback) = recorder();
        let _handle = watch(
            vec![WatchSource::from(&a), WatchSource::from(&b)],
            callback,
            WatchOptions::default(),
        );

        b.set_value(3);
        flush_jobs();

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        let (new, old) = &calls[0];
        assert_eq!(new.as_object().expect("array").items(), vec![Value::from(1), Value::from(3)]);
        assert_eq!(old.as_object().expect("array").items(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn shallow_ref_source_always_fires() {
        let r = shallow_ref(json!({"x": 1}));
        let (calls, callback) = recorder();
        let _handle = watch(&r, callback, WatchOptions::default());

        trigger_ref(&r);
        flush_jobs();
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn computed_source() {
        let count = ref_(1);
        let count_clone = count.clone();
        let doubled = computed(move || count_clone.value().as_i64().unwrap_or(0) * 2);
        let (calls, callback) = recorder();
        let _handle = watch(&doubled, callback, WatchOptions::default());

        count.set_value(2);
        flush_jobs();
        assert_eq!(*calls.lock(), vec![(Value::from(4), Value::from(2))]);
    }

    #[test]
    fn sync_flush_calls_back_on_every_write() {
        let count = ref_(0);
        let (calls, callback) = recorder();
        let _handle = watch(
            &count,
            callback,
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        count.set_value(1);
        count.set_value(2);
        assert_eq!(calls.lock().len(), 2);
        assert!(!has_pending_jobs());
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = ref_(0);
        let cleanups = Arc::new(AtomicI32::new(0));
        let cleanups_clone = cleanups.clone();

        let handle = watch(
            &count,
            move |_, _, on_invalidate| {
                let cleanups = cleanups_clone.clone();
                on_invalidate.register(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                });
            },
            WatchOptions::default(),
        );

        count.set_value(1);
        flush_jobs();
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        count.set_value(2);
        flush_jobs();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn watch_effect_runs_now_and_after_flush() {
        let count = ref_(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let count_clone = count.clone();
        let seen_clone = seen.clone();
        let _handle = watch_effect(move |_| {
            let value = count_clone.value().as_i64().unwrap_or(-1);
            seen_clone.store(value as i32, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        count.set_value(3);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        flush_jobs();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn watch_post_effect_waits_for_the_first_flush() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let _handle = watch_post_effect(move |_| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watch_sync_effect_cleanup_runs_before_each_rerun() {
        let count = ref_(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let cleanups_clone = cleanups.clone();
        let handle = watch_sync_effect(move |on_invalidate| {
            count_clone.value();
            let cleanups = cleanups_clone.clone();
            on_invalidate.register(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            });
        });

        count.set_value(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        drop(handle);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalid_sources_never_fire() {
        let (calls, callback) = recorder();
        let handle = watch(Value::from(1), callback, WatchOptions::default());
        flush_jobs();
        assert!(calls.lock().is_empty());
        assert!(handle.is_active());
    }

    #[test]
    fn options_load_from_json() {
        let options: WatchOptions =
            serde_json::from_value(json!({"deep": true, "flush": "post"})).expect("valid options");
        assert_eq!(
            options,
            WatchOptions {
                immediate: false,
                deep: true,
                flush: FlushMode::Post,
            }
        );
    }
}
