//! Proxy Access Handlers
//!
//! The interception logic behind every [`Proxy`] operation.
//!
//! # Reads
//!
//! 1. Flag keys (`__v_isReactive`, `__v_isReadonly`, `__v_raw`) are answered
//!    by the proxy itself.
//! 2. On array proxies, identity-sensitive and bulk-mutating method names
//!    resolve to instrumented functions bound to the proxy. Read-only
//!    proxies resolve only the bulk mutators, whose writes they ignore.
//! 3. The read is forwarded to the target. Built-in symbols and internal
//!    marker keys return here without tracking.
//! 4. Mutable proxies track the read.
//! 5. Shallow proxies return the stored value.
//! 6. Deep proxies unwrap refs (except array elements at integer keys) and
//!    lazily wrap nested objects in the matching proxy variant.
//!
//! # Writes
//!
//! Writes store raw values. Assigning a non-ref to a plain-object field that
//! currently holds a ref writes through the ref instead of replacing it.
//! Creating a slot always notifies; overwriting one notifies only when the
//! value changed. Read-only proxies accept and ignore every write. A write the
//! raw object rejects leaves it unchanged and notifies nothing.

use tracing::warn;

use super::array;
use super::proxy::{flags, to_raw, to_reactive, to_readonly, Proxy, ProxyTarget};
use super::runtime::{track, trigger, TrackOp, TriggerOp};
use crate::value::{has_changed, Object, PropKey, Value};

/// Keys that are read through without tracking.
const NON_TRACKABLE_KEYS: [&str; 2] = ["__proto__", "__v_isRef"];

fn is_non_trackable(key: &PropKey) -> bool {
    match key {
        PropKey::Symbol(symbol) => symbol.is_builtin(),
        PropKey::Name(name) => NON_TRACKABLE_KEYS.contains(&&**name),
    }
}

impl Proxy {
    /// The mutable raw object behind a non-readonly proxy.
    fn mutable_target(&self) -> Option<&Object> {
        match self.target() {
            ProxyTarget::Object(object) if !self.is_readonly() => Some(object),
            _ => None,
        }
    }

    /// Read a property.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        let readonly = self.is_readonly();

        if let Some(name) = key.as_name() {
            match name {
                flags::IS_REACTIVE => return Value::Bool(!readonly),
                flags::IS_READONLY => return Value::Bool(readonly),
                flags::RAW => return self.target().to_value(),
                _ => {}
            }
        }

        let target_is_array = self.is_array();
        if target_is_array {
            if let Some(method) = array::instrumented(self, &key) {
                return method;
            }
        }

        let res = self.target().get(&key);

        if is_non_trackable(&key) {
            return res;
        }

        if let Some(object) = self.mutable_target() {
            track(object, TrackOp::Get, &key);
        }

        if self.is_shallow() {
            return res;
        }

        if let Value::Ref(r) = &res {
            // [1, ref(2)] keeps its element refs so they stay reactive.
            let should_unwrap = !target_is_array || !key.is_integer_key();
            return if should_unwrap { r.value() } else { res };
        }

        if readonly {
            to_readonly(res)
        } else {
            to_reactive(res)
        }
    }

    /// Write a property.
    ///
    /// Reports `false` only when the target rejects the write, such as an
    /// array index too far past the end. Writes to read-only proxies are
    /// ignored and still report success.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let mut value = value.into();

        let Some(target) = self.mutable_target() else {
            warn!(%key, "set operation on key failed: target is readonly");
            return true;
        };

        let mut old_value = target.get(&key);
        if !self.is_shallow() {
            value = to_raw(&value);
            old_value = to_raw(&old_value);
            if !target.is_array() && !value.is_ref() {
                if let Value::Ref(old_ref) = &old_value {
                    old_ref.set_value(value);
                    return true;
                }
            }
        }

        let had_key = match key.as_index() {
            Some(index) if target.is_array() => index < target.len(),
            _ => target.has_own(&key),
        };

        if let Err(err) = target.set(key.clone(), value.clone()) {
            warn!(%key, %err, "set operation on key failed");
            return false;
        }

        if !had_key {
            trigger(target, TriggerOp::Add, &key, &value);
        } else if has_changed(&value, &old_value) {
            trigger(target, TriggerOp::Set, &key, &value);
        }
        true
    }

    /// Delete a property. Always reports success.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();

        let Some(target) = self.mutable_target() else {
            warn!(%key, "delete operation on key failed: target is readonly");
            return true;
        };

        let had_key = target.has_own(&key);
        let removed = target.remove(&key);
        if had_key && removed.is_some() {
            trigger(target, TriggerOp::Delete, &key, &Value::Undefined);
        }
        true
    }

    /// Whether the property exists.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        let result = self.target().has(&key);
        if let Some(object) = self.mutable_target() {
            if !is_non_trackable(&key) {
                track(object, TrackOp::Has, &key);
            }
        }
        result
    }

    /// Own enumerable keys.
    ///
    /// Mutable proxies register a dependency on key iteration, so enumerating
    /// code re-runs when keys are added or removed.
    pub fn own_keys(&self) -> Vec<PropKey> {
        if let Some(object) = self.mutable_target() {
            let key = if object.is_array() {
                PropKey::length()
            } else {
                PropKey::iterate()
            };
            track(object, TrackOp::Iterate, &key);
        }
        self.target().own_keys()
    }

    /// Array length, or property count for plain objects.
    pub fn len(&self) -> usize {
        if self.is_array() {
            self.get(PropKey::length()).as_index().unwrap_or(0)
        } else {
            self.own_keys().len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
