//! Deep traversal.
//!
//! Reads every reachable slot of a value so that the running effect
//! subscribes to all of them. The read values are discarded; the reads are
//! the point.

use std::collections::HashMap;

use crate::value::Value;

/// Touch every nested slot of `value` and return it unchanged.
pub fn traverse(value: Value) -> Value {
    let mut seen = HashMap::new();
    visit(&value, &mut seen);
    value
}

/// Visited values, kept alive for the whole walk so that a proxy created
/// and dropped mid-walk cannot hand its address to a later one.
type Seen = HashMap<usize, Value>;

fn visit(value: &Value, seen: &mut Seen) {
    if let Value::Object(object) = value {
        if object.is_marked_raw() {
            return;
        }
    }
    // Primitives have no identity and nothing to walk.
    let Some(identity) = value.identity() else {
        return;
    };
    if seen.contains_key(&identity) {
        return;
    }
    seen.insert(identity, value.clone());

    match value {
        Value::Ref(r) => visit(&r.value(), seen),
        Value::Proxy(proxy) if proxy.is_array() => {
            for index in 0..proxy.len() {
                visit(&proxy.get(index), seen);
            }
        }
        Value::Proxy(proxy) => {
            for key in proxy.own_keys() {
                visit(&proxy.get(key), seen);
            }
        }
        Value::Object(object) => {
            for (_, item) in object.entries() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}
