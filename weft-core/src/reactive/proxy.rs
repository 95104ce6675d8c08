//! Reactive Proxies
//!
//! A [`Proxy`] is a tracked view over a raw object. Reads through a mutable
//! proxy record dependencies, writes notify the effects that read the
//! written slot. There are four variants, composed from two axes:
//!
//! | variant            | tracks | writes | nested values          |
//! |--------------------|--------|--------|------------------------|
//! | `reactive`         | yes    | yes    | wrapped, refs unwrapped|
//! | `shallow_reactive` | yes    | yes    | returned as stored     |
//! | `readonly`         | no     | no-op  | wrapped read-only      |
//! | `shallow_readonly` | no     | no-op  | returned as stored     |
//!
//! # Identity
//!
//! Each variant keeps its own identity cache keyed by the wrapped target, so
//! wrapping the same object twice yields the same proxy. The caches hold weak
//! handles; a proxy removes its entry when its last handle is dropped.
//!
//! All access goes through explicit methods (`get`, `set`, `delete`, `has`,
//! `own_keys`) rather than field syntax.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use tracing::trace;

use crate::value::{Object, ObjectId, PropKey, Value};

/// Keys answered synthetically by every proxy.
pub mod flags {
    pub const IS_REACTIVE: &str = "__v_isReactive";
    pub const IS_READONLY: &str = "__v_isReadonly";
    pub const RAW: &str = "__v_raw";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl ProxyKind {
    pub fn is_readonly(self) -> bool {
        matches!(self, ProxyKind::Readonly | ProxyKind::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, ProxyKind::ShallowReactive | ProxyKind::ShallowReadonly)
    }

    fn cache_index(self) -> usize {
        match self {
            ProxyKind::Reactive => 0,
            ProxyKind::ShallowReactive => 1,
            ProxyKind::Readonly => 2,
            ProxyKind::ShallowReadonly => 3,
        }
    }
}

/// What a proxy wraps: a raw object, or (for read-only views over a
/// reactive proxy) another proxy.
#[derive(Clone)]
pub(crate) enum ProxyTarget {
    Object(Object),
    Proxy(Proxy),
}

impl ProxyTarget {
    fn id(&self) -> ObjectId {
        match self {
            ProxyTarget::Object(object) => object.id(),
            ProxyTarget::Proxy(proxy) => proxy.id(),
        }
    }

    pub(crate) fn get(&self, key: &PropKey) -> Value {
        match self {
            ProxyTarget::Object(object) => object.get(key),
            ProxyTarget::Proxy(proxy) => proxy.get(key.clone()),
        }
    }

    pub(crate) fn has(&self, key: &PropKey) -> bool {
        match self {
            ProxyTarget::Object(object) => object.has_own(key),
            ProxyTarget::Proxy(proxy) => proxy.has(key.clone()),
        }
    }

    pub(crate) fn own_keys(&self) -> Vec<PropKey> {
        match self {
            ProxyTarget::Object(object) => object.keys(),
            ProxyTarget::Proxy(proxy) => proxy.own_keys(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            ProxyTarget::Object(object) => Value::Object(object.clone()),
            ProxyTarget::Proxy(proxy) => Value::Proxy(proxy.clone()),
        }
    }
}

pub(crate) struct ProxyInner {
    id: ObjectId,
    pub(crate) target: ProxyTarget,
    pub(crate) kind: ProxyKind,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        if let Some(caches) = CACHES.get() {
            caches[self.kind.cache_index()]
                .remove_if(&self.target.id(), |_, proxy| proxy.strong_count() == 0);
        }
    }
}

type ProxyCache = DashMap<ObjectId, Weak<ProxyInner>>;

static CACHES: OnceLock<[ProxyCache; 4]> = OnceLock::new();

fn caches() -> &'static [ProxyCache; 4] {
    CACHES.get_or_init(|| [DashMap::new(), DashMap::new(), DashMap::new(), DashMap::new()])
}

/// A tracked view over an object.
#[derive(Clone)]
pub struct Proxy(pub(crate) Arc<ProxyInner>);

impl Proxy {
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> ProxyKind {
        self.0.kind
    }

    pub fn is_readonly(&self) -> bool {
        self.0.kind.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.kind.is_shallow()
    }

    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn target(&self) -> &ProxyTarget {
        &self.0.target
    }

    /// The raw object at the bottom of the proxy chain.
    pub fn raw_object(&self) -> Object {
        match &self.0.target {
            ProxyTarget::Object(object) => object.clone(),
            ProxyTarget::Proxy(proxy) => proxy.raw_object(),
        }
    }

    /// Whether the underlying raw object is an array.
    pub fn is_array(&self) -> bool {
        self.raw_object().is_array()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("raw", &self.raw_object().id())
            .finish()
    }
}

fn create_proxy(target: Value, kind: ProxyKind) -> Value {
    let target = match target {
        Value::Object(object) => {
            if object.is_marked_raw() {
                return Value::Object(object);
            }
            ProxyTarget::Object(object)
        }
        Value::Proxy(proxy) => {
            // Already a proxy. Only a read-only view over a mutable proxy
            // creates a new layer.
            if !(kind.is_readonly() && proxy.get(flags::IS_REACTIVE).is_truthy()) {
                return Value::Proxy(proxy);
            }
            ProxyTarget::Proxy(proxy)
        }
        other => {
            trace!(value = ?other, "value cannot be made reactive");
            return other;
        }
    };

    let cache = &caches()[kind.cache_index()];
    let mut entry = cache.entry(target.id()).or_insert_with(Weak::new);
    if let Some(existing) = entry.upgrade() {
        return Value::Proxy(Proxy(existing));
    }

    let proxy = Arc::new(ProxyInner {
        id: ObjectId::next(),
        target,
        kind,
    });
    *entry = Arc::downgrade(&proxy);
    Value::Proxy(Proxy(proxy))
}

/// Deep mutable proxy.
pub fn reactive(target: impl Into<Value>) -> Value {
    create_proxy(target.into(), ProxyKind::Reactive)
}

/// Mutable proxy that tracks only root-level properties.
pub fn shallow_reactive(target: impl Into<Value>) -> Value {
    create_proxy(target.into(), ProxyKind::ShallowReactive)
}

/// Deep read-only proxy.
pub fn readonly(target: impl Into<Value>) -> Value {
    create_proxy(target.into(), ProxyKind::Readonly)
}

/// Read-only proxy that leaves nested values as stored.
pub fn shallow_readonly(target: impl Into<Value>) -> Value {
    create_proxy(target.into(), ProxyKind::ShallowReadonly)
}

/// Whether `value` is a mutable proxy, or a read-only view over one.
pub fn is_reactive(value: &Value) -> bool {
    let Value::Proxy(proxy) = value else {
        return false;
    };
    if is_readonly(value) {
        return is_reactive(&proxy.get(flags::RAW));
    }
    proxy.get(flags::IS_REACTIVE).is_truthy()
}

pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.get(flags::IS_READONLY).is_truthy(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// The raw value behind any chain of proxies.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => to_raw(&proxy.get(flags::RAW)),
        other => other.clone(),
    }
}

/// Permanently exclude an object from reactive wrapping.
pub fn mark_raw(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Value::Object(object) = &value {
        object.mark_raw();
    }
    value
}

/// Wrap `value` in a deep reactive proxy if it is an object.
pub(crate) fn to_reactive(value: Value) -> Value {
    if value.is_object() {
        reactive(value)
    } else {
        value
    }
}

pub(crate) fn to_readonly(value: Value) -> Value {
    if value.is_object() {
        readonly(value)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object() -> Value {
        Value::from(json!({"a": 1, "nested": {"b": 2}}))
    }

    #[test]
    fn wrapping_is_idempotent() {
        let raw = object();
        let first = reactive(raw.clone());
        let second = reactive(raw.clone());

        assert_eq!(first, second);
        assert_eq!(reactive(first.clone()), first);
        assert_ne!(first, raw);
    }

    #[test]
    fn variants_have_separate_identities() {
        let raw = object();
        let mutable = reactive(raw.clone());
        let shallow = shallow_reactive(raw.clone());
        let frozen = readonly(raw.clone());

        assert_ne!(mutable, shallow);
        assert_ne!(mutable, frozen);
        assert_eq!(to_raw(&shallow), raw);
        assert_eq!(to_raw(&frozen), raw);
    }

    #[test]
    fn readonly_over_reactive_reports_both() {
        let raw = object();
        let mutable = reactive(raw.clone());
        let frozen = readonly(mutable.clone());

        assert!(is_reactive(&frozen));
        assert!(is_readonly(&frozen));
        assert!(is_proxy(&frozen));
        assert_eq!(to_raw(&frozen), raw);
        assert_eq!(readonly(frozen.clone()), frozen);
        assert_eq!(reactive(frozen.clone()), frozen);
    }

    #[test]
    fn readonly_of_raw_is_not_reactive() {
        let frozen = readonly(object());
        assert!(!is_reactive(&frozen));
        assert!(is_readonly(&frozen));
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(reactive(1), Value::from(1));
        assert_eq!(readonly("x"), Value::from("x"));
        assert!(!is_reactive(&Value::from(1)));
        assert!(!is_reactive(&object()));
    }

    #[test]
    fn marked_raw_objects_are_never_wrapped() {
        let raw = mark_raw(object());
        assert_eq!(reactive(raw.clone()), raw);
        assert!(!is_proxy(&readonly(raw)));
    }

    #[test]
    fn dropped_proxy_leaves_the_cache() {
        let raw = object();
        let id = raw.as_object().expect("object").id();

        let proxy = reactive(raw.clone());
        assert!(caches()[0].contains_key(&id));

        drop(proxy);
        assert!(!caches()[0].contains_key(&id));
    }
}
