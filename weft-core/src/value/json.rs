//! JSON interop.
//!
//! JSON documents convert into fresh raw objects, which makes seeding
//! reactive state from configuration or fixtures straightforward. In the
//! other direction a value serializes as its raw snapshot: proxies are seen
//! through, refs are read without tracking, functions become `null` and any
//! reference cycle is cut with `null`.

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use serde_json::{Map, Number};

use super::{Object, PropKey, Value};
use crate::reactive::{to_raw, untracked};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Object::array(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => {
                Value::Object(Object::from_entries(map.into_iter().map(|(k, v)| (k, Value::from(v)))))
            }
        }
    }
}

impl Value {
    /// Untracked JSON snapshot of this value.
    pub fn to_json(&self) -> serde_json::Value {
        untracked(|| snapshot(self, &mut HashSet::new()))
    }
}

fn snapshot(value: &Value, seen: &mut HashSet<usize>) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(_) => match value.as_i64() {
            Some(int) => serde_json::Value::Number(Number::from(int)),
            None => value
                .as_f64()
                .and_then(Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        },
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Ref(r) => snapshot(&r.value(), seen),
        Value::Proxy(_) => snapshot(&to_raw(value), seen),
        Value::Object(object) => {
            if !seen.insert(object.addr()) {
                return serde_json::Value::Null;
            }
            let json = if object.is_array() {
                serde_json::Value::Array(
                    object.items().iter().map(|item| snapshot(item, seen)).collect(),
                )
            } else {
                let mut map = Map::new();
                for (key, item) in object.entries() {
                    if let PropKey::Name(name) = key {
                        map.insert(name.to_string(), snapshot(&item, seen));
                    }
                }
                serde_json::Value::Object(map)
            };
            seen.remove(&object.addr());
            json
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
