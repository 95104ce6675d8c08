//! Ref Cells
//!
//! A [`Ref`] is a single observable slot read and written through
//! [`Ref::value`] and [`Ref::set_value`]. Every ref-shaped cell shares the
//! same handle type, so refs, property refs, custom refs and computed refs
//! can all be stored in objects and watched the same way.
//!
//! # How Refs Work
//!
//! 1. Reading the value subscribes the running effect to the ref's private
//!    dependency set.
//!
//! 2. Writing compares the raw forms of the new and old value. On a change,
//!    the new value is stored first (objects wrapped reactive unless the ref
//!    is shallow) and only then are dependents notified, so an effect that
//!    re-runs during notification reads the new value.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::dep::Dep;
use super::proxy::{to_raw, to_reactive, Proxy};
use super::runtime::{track_effects, trigger_effects};
use crate::value::{has_changed, Object, PropKey, Value};

/// Behavior behind a [`Ref`] handle.
pub trait RefImpl: Send + Sync {
    /// Read the value, tracking the read.
    fn get(&self) -> Value;

    /// Write the value, notifying dependents on change.
    fn set(&self, value: Value);

    /// The ref's own dependency set, if it has one.
    fn dep(&self) -> Option<Dep> {
        None
    }

    fn is_shallow(&self) -> bool {
        false
    }

    fn is_readonly(&self) -> bool {
        false
    }
}

/// Shared handle to a ref cell.
#[derive(Clone)]
pub struct Ref(Arc<dyn RefImpl>);

impl Ref {
    pub fn new(inner: Arc<dyn RefImpl>) -> Self {
        Self(inner)
    }

    pub fn value(&self) -> Value {
        self.0.get()
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    pub fn is_shallow(&self) -> bool {
        self.0.is_shallow()
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    pub(crate) fn dep(&self) -> Option<Dep> {
        self.0.dep()
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("shallow", &self.is_shallow())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Value refs
// ----------------------------------------------------------------------------

struct ValueSlot {
    /// Raw form, used for change comparison.
    raw: Value,
    /// What readers see.
    value: Value,
}

struct ValueRef {
    slot: RwLock<ValueSlot>,
    shallow: bool,
    dep: Dep,
}

impl ValueRef {
    fn new(value: Value, shallow: bool) -> Self {
        let (raw, value) = if shallow {
            (value.clone(), value)
        } else {
            (to_raw(&value), to_reactive(value))
        };
        Self {
            slot: RwLock::new(ValueSlot { raw, value }),
            shallow,
            dep: Dep::new(),
        }
    }
}

impl RefImpl for ValueRef {
    fn get(&self) -> Value {
        track_effects(&self.dep);
        self.slot.read().value.clone()
    }

    fn set(&self, value: Value) {
        let new_raw = if self.shallow { value } else { to_raw(&value) };
        {
            let mut slot = self.slot.write();
            if !has_changed(&new_raw, &slot.raw) {
                return;
            }
            slot.value = if self.shallow {
                new_raw.clone()
            } else {
                to_reactive(new_raw.clone())
            };
            slot.raw = new_raw;
        }
        trigger_effects([self.dep.clone()]);
    }

    fn dep(&self) -> Option<Dep> {
        Some(self.dep.clone())
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

fn create_ref(value: Value, shallow: bool) -> Ref {
    if let Value::Ref(r) = value {
        return r;
    }
    Ref::new(Arc::new(ValueRef::new(value, shallow)))
}

/// Deep ref: object values are stored as reactive proxies.
pub fn ref_(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), false)
}

/// Ref whose value is stored as given; only reassignment is tracked.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), true)
}

pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}

/// The ref's value for refs, the value itself otherwise.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.value(),
        other => other.clone(),
    }
}

/// Whether `value` is a shallow ref or a shallow proxy.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Ref(r) => r.is_shallow(),
        Value::Proxy(proxy) => proxy.is_shallow(),
        _ => false,
    }
}

/// Notify the dependents of `r` without changing it.
///
/// Used after mutating the inside of a shallow ref's value.
pub fn trigger_ref(r: &Ref) {
    if let Some(dep) = r.dep() {
        trigger_effects([dep]);
    }
}

// ----------------------------------------------------------------------------
// Property refs
// ----------------------------------------------------------------------------

enum PropertyOwner {
    Proxy(Proxy),
    Object(Object),
}

impl PropertyOwner {
    fn get(&self, key: &PropKey) -> Value {
        match self {
            PropertyOwner::Proxy(proxy) => proxy.get(key),
            PropertyOwner::Object(object) => object.get(key),
        }
    }

    fn set(&self, key: &PropKey, value: Value) {
        match self {
            PropertyOwner::Proxy(proxy) => {
                proxy.set(key, value);
            }
            PropertyOwner::Object(object) => {
                if let Err(err) = object.set(key.clone(), value) {
                    warn!(%key, %err, "property ref write rejected");
                }
            }
        }
    }
}

/// A ref bound to one property of an object. Tracking and notification
/// are those of the owner.
struct PropertyRef {
    owner: PropertyOwner,
    key: PropKey,
}

impl RefImpl for PropertyRef {
    fn get(&self) -> Value {
        self.owner.get(&self.key)
    }

    fn set(&self, value: Value) {
        self.owner.set(&self.key, value);
    }

    fn is_readonly(&self) -> bool {
        matches!(&self.owner, PropertyOwner::Proxy(proxy) if proxy.is_readonly())
    }
}

/// A ref that reads and writes `object[key]`.
///
/// If the property already holds a ref, that ref is returned. Returns `None`
/// when `object` is not an object.
pub fn to_ref(object: &Value, key: impl Into<PropKey>) -> Option<Ref> {
    let owner = match object {
        Value::Proxy(proxy) => PropertyOwner::Proxy(proxy.clone()),
        Value::Object(object) => PropertyOwner::Object(object.clone()),
        _ => return None,
    };
    let key = key.into();
    if let Value::Ref(existing) = owner.get(&key) {
        return Some(existing);
    }
    Some(Ref::new(Arc::new(PropertyRef { owner, key })))
}

/// A property ref for every own key of `object`.
pub fn to_refs(object: &Value) -> IndexMap<PropKey, Ref> {
    let keys = match object {
        Value::Proxy(proxy) => proxy.own_keys(),
        Value::Object(raw) => {
            warn!(object = ?raw.id(), "to_refs() expects a reactive object but received a plain one");
            raw.keys()
        }
        _ => {
            warn!(value = ?object, "to_refs() expects a reactive object");
            return IndexMap::new();
        }
    };
    keys.into_iter()
        .filter_map(|key| to_ref(object, key.clone()).map(|r| (key, r)))
        .collect()
}

// ----------------------------------------------------------------------------
// Custom refs
// ----------------------------------------------------------------------------

/// Tracking hooks handed to a [`custom_ref`] factory.
#[derive(Clone, Debug)]
pub struct RefTracker {
    dep: Dep,
}

impl RefTracker {
    /// Subscribe the running effect to this ref.
    pub fn track(&self) {
        track_effects(&self.dep);
    }

    /// Notify this ref's dependents.
    pub fn trigger(&self) {
        trigger_effects([self.dep.clone()]);
    }
}

type CustomGet = Box<dyn Fn() -> Value + Send + Sync>;
type CustomSet = Box<dyn Fn(Value) + Send + Sync>;

struct CustomRef {
    dep: Dep,
    get: CustomGet,
    set: CustomSet,
}

impl RefImpl for CustomRef {
    fn get(&self) -> Value {
        (self.get)()
    }

    fn set(&self, value: Value) {
        (self.set)(value)
    }

    fn dep(&self) -> Option<Dep> {
        Some(self.dep.clone())
    }
}

/// A ref with user-controlled tracking and notification.
///
/// `factory` receives the ref's [`RefTracker`] and returns its getter and
/// setter, which decide when to call `track` and `trigger`.
pub fn custom_ref<F, G, S>(factory: F) -> Ref
where
    F: FnOnce(RefTracker) -> (G, S),
    G: Fn() -> Value + Send + Sync + 'static,
    S: Fn(Value) + Send + Sync + 'static,
{
    let dep = Dep::new();
    let (get, set) = factory(RefTracker { dep: dep.clone() });
    Ref::new(Arc::new(CustomRef {
        dep,
        get: Box::new(get),
        set: Box::new(set),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::proxy::{is_reactive, reactive, readonly};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn observe(r: &Ref) -> (crate::reactive::effect::EffectRunner, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let r = r.clone();
        let runner = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            r.value();
        });
        (runner, runs)
    }

    #[test]
    fn ref_notifies_only_on_change() {
        let count = ref_(1);
        let (_runner, runs) = observe(&count);

        count.set_value(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        count.set_value(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        count.set_value(f64::NAN);
        count.set_value(f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dependents_see_the_new_value() {
        let count = ref_(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let count_clone = count.clone();
        let seen_clone = seen.clone();
        let _runner = effect(move || {
            let value = count_clone.value().as_i64().unwrap_or(-1);
            seen_clone.store(value as i32, Ordering::SeqCst);
        });

        count.set_value(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn ref_of_a_ref_is_the_same_ref() {
        let a = ref_(1);
        let b = ref_(a.clone());
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn deep_ref_wraps_objects() {
        let r = ref_(json!({"a": 1}));
        assert!(is_reactive(&r.value()));

        let (_runner, runs) = observe(&r);
        let nested_runs = Arc::new(AtomicI32::new(0));
        let r_clone = r.clone();
        let nested_runs_clone = nested_runs.clone();
        let _nested = effect(move || {
            nested_runs_clone.fetch_add(1, Ordering::SeqCst);
            if let Value::Proxy(proxy) = r_clone.value() {
                proxy.get("a");
            }
        });

        r.value().as_proxy().expect("proxy").set("a", 2);
        assert_eq!(nested_runs.load(Ordering::SeqCst), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn setting_the_same_object_through_its_proxy_is_no_change() {
        let r = ref_(json!({}));
        let (_runner, runs) = observe(&r);

        r.set_value(r.value());
        r.set_value(to_raw(&r.value()));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shallow_ref_needs_an_explicit_trigger() {
        let r = shallow_ref(json!({"a": 1}));
        assert!(r.value().as_object().is_some());
        assert!(r.is_shallow());

        let (_runner, runs) = observe(&r);
        r.value().as_object().expect("object").set("a".into(), Value::from(2)).expect("write");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger_ref(&r);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unref_and_is_ref() {
        let r = ref_(3);
        assert!(is_ref(&Value::from(r.clone())));
        assert_eq!(unref(&Value::from(r)), Value::from(3));
        assert_eq!(unref(&Value::from(4)), Value::from(4));
        assert!(!is_ref(&Value::from(4)));
    }

    #[test]
    fn property_refs_stay_linked_to_the_owner() {
        let state = reactive(json!({"foo": 1}));
        let foo = to_ref(&state, "foo").expect("object");
        let proxy = state.as_proxy().expect("proxy");

        assert_eq!(foo.value(), Value::from(1));
        proxy.set("foo", 2);
        assert_eq!(foo.value(), Value::from(2));
        foo.set_value(3);
        assert_eq!(proxy.get("foo"), Value::from(3));

        let (_runner, runs) = observe(&foo);
        proxy.set("foo", 4);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn to_ref_returns_an_existing_ref() {
        let inner = ref_(1);
        let raw = Object::plain();
        raw.set("r".into(), Value::from(inner.clone())).expect("write");

        let r = to_ref(&Value::from(raw), "r").expect("object");
        assert!(r.ptr_eq(&inner));
        assert!(to_ref(&Value::from(1), "r").is_none());
    }

    #[test]
    fn to_refs_covers_every_key() {
        let state = reactive(json!({"a": 1, "b": 2}));
        let refs = to_refs(&state);

        assert_eq!(refs.len(), 2);
        refs[&PropKey::from("b")].set_value(5);
        assert_eq!(state.as_proxy().expect("proxy").get("b"), Value::from(5));
    }

    #[test]
    fn readonly_property_refs_report_readonly() {
        let frozen = readonly(json!({"a": 1}));
        let a = to_ref(&frozen, "a").expect("object");
        assert!(a.is_readonly());
        a.set_value(2);
        assert_eq!(a.value(), Value::from(1));
    }

    #[test]
    fn custom_ref_controls_tracking() {
        let stored = Arc::new(Mutex::new(Value::from(1)));
        let stored_get = stored.clone();
        let stored_set = stored.clone();

        let custom = custom_ref(move |tracker| {
            let get_tracker = tracker.clone();
            (
                move || {
                    get_tracker.track();
                    stored_get.lock().clone()
                },
                move |value| {
                    *stored_set.lock() = value;
                    tracker.trigger();
                },
            )
        });

        let (_runner, runs) = observe(&custom);
        custom.set_value(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(custom.value(), Value::from(2));
    }
}
