//! Raw Objects
//!
//! An [`Object`] is the plain, untracked data behind every reactive proxy:
//! either an ordered map of properties or an array. Reading or writing a raw
//! object never records or notifies dependencies; only access routed through
//! a [`Proxy`](crate::reactive::Proxy) does.
//!
//! # Identity
//!
//! Each object receives a stable [`ObjectId`] when it is created. The
//! dependency registry and the proxy caches are keyed by this id, so every
//! proxy variant over one object shares a single set of dependencies. When the
//! last handle to an object is dropped its registry entry is removed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{PropKey, Value};
use crate::error::ReactiveError;
use crate::reactive::runtime;

/// Most slots a single array write may add. Arrays are stored densely, so a
/// write far past the end is rejected instead of allocating the gap.
pub const MAX_ARRAY_GROWTH: usize = 1 << 20;

/// Stable identity of a reference-typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Array,
}

pub(crate) enum ObjectData {
    Plain(IndexMap<PropKey, Value>),
    Array {
        items: Vec<Value>,
        /// Custom non-index properties stored on the array.
        props: IndexMap<PropKey, Value>,
    },
}

struct ObjectCell {
    id: ObjectId,
    skip: AtomicBool,
    data: RwLock<ObjectData>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        runtime::forget_target(self.id);
    }
}

/// Shared handle to a raw object or array.
#[derive(Clone)]
pub struct Object(Arc<ObjectCell>);

impl Object {
    fn from_data(data: ObjectData) -> Self {
        Self(Arc::new(ObjectCell {
            id: ObjectId::next(),
            skip: AtomicBool::new(false),
            data: RwLock::new(data),
        }))
    }

    /// Create an empty plain object.
    pub fn plain() -> Self {
        Self::from_data(ObjectData::Plain(IndexMap::new()))
    }

    /// Create a plain object from key/value pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<PropKey>,
        V: Into<Value>,
    {
        Self::from_data(ObjectData::Plain(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// Create an array holding the given elements.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_data(ObjectData::Array {
            items: items.into_iter().map(Into::into).collect(),
            props: IndexMap::new(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> ObjectKind {
        match &*self.0.data.read() {
            ObjectData::Plain(_) => ObjectKind::Plain,
            ObjectData::Array { .. } => ObjectKind::Array,
        }
    }

    pub fn is_array(&self) -> bool {
        self.kind() == ObjectKind::Array
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether the object has been excluded from reactive wrapping.
    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_raw(&self) {
        self.0.skip.store(true, Ordering::Relaxed);
    }

    /// Read a property. Missing properties read as `Undefined`.
    pub fn get(&self, key: &PropKey) -> Value {
        match &*self.0.data.read() {
            ObjectData::Plain(map) => map.get(key).cloned().unwrap_or_default(),
            ObjectData::Array { items, props } => {
                if let Some(index) = key.as_index() {
                    items.get(index).cloned().unwrap_or_default()
                } else if key.is_length() {
                    Value::from(items.len())
                } else {
                    props.get(key).cloned().unwrap_or_default()
                }
            }
        }
    }

    pub fn has_own(&self, key: &PropKey) -> bool {
        match &*self.0.data.read() {
            ObjectData::Plain(map) => map.contains_key(key),
            ObjectData::Array { items, props } => {
                if let Some(index) = key.as_index() {
                    index < items.len()
                } else {
                    key.is_length() || props.contains_key(key)
                }
            }
        }
    }

    /// Write a property.
    ///
    /// Writing past the end of an array pads the gap with `Undefined`.
    /// Writing `length` truncates or extends the array; a length that is not a
    /// non-negative integer is ignored. Growing an array by more than
    /// [`MAX_ARRAY_GROWTH`] slots fails and leaves it unchanged.
    pub fn set(&self, key: PropKey, value: Value) -> Result<(), ReactiveError> {
        match &mut *self.0.data.write() {
            ObjectData::Plain(map) => {
                map.insert(key, value);
            }
            ObjectData::Array { items, props } => {
                if let Some(index) = key.as_index() {
                    if index >= items.len() {
                        check_growth(items.len(), index + 1)?;
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                } else if key.is_length() {
                    if let Some(len) = value.as_index() {
                        check_growth(items.len(), len)?;
                        items.resize(len, Value::Undefined);
                    }
                } else {
                    props.insert(key, value);
                }
            }
        }
        Ok(())
    }

    /// Remove a property, returning its previous value.
    ///
    /// Removing an array element leaves an `Undefined` in its slot and keeps
    /// the length unchanged. `length` itself cannot be removed.
    pub fn remove(&self, key: &PropKey) -> Option<Value> {
        match &mut *self.0.data.write() {
            ObjectData::Plain(map) => map.shift_remove(key),
            ObjectData::Array { items, props } => {
                if let Some(index) = key.as_index() {
                    items
                        .get_mut(index)
                        .map(|slot| std::mem::replace(slot, Value::Undefined))
                } else if key.is_length() {
                    None
                } else {
                    props.shift_remove(key)
                }
            }
        }
    }

    /// Own enumerable keys: array indices first, then named properties.
    pub fn keys(&self) -> Vec<PropKey> {
        match &*self.0.data.read() {
            ObjectData::Plain(map) => map.keys().cloned().collect(),
            ObjectData::Array { items, props } => (0..items.len())
                .map(PropKey::from)
                .chain(props.keys().cloned())
                .collect(),
        }
    }

    /// Number of elements for arrays, number of properties otherwise.
    pub fn len(&self) -> usize {
        match &*self.0.data.read() {
            ObjectData::Plain(map) => map.len(),
            ObjectData::Array { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the array elements, empty for plain objects.
    pub fn items(&self) -> Vec<Value> {
        match &*self.0.data.read() {
            ObjectData::Plain(_) => Vec::new(),
            ObjectData::Array { items, .. } => items.clone(),
        }
    }

    /// Snapshot of all own properties in key order.
    pub fn entries(&self) -> Vec<(PropKey, Value)> {
        match &*self.0.data.read() {
            ObjectData::Plain(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ObjectData::Array { items, props } => items
                .iter()
                .enumerate()
                .map(|(index, value)| (PropKey::from(index), value.clone()))
                .chain(props.iter().map(|(k, v)| (k.clone(), v.clone())))
                .collect(),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

fn check_growth(len: usize, requested: usize) -> Result<(), ReactiveError> {
    if requested.saturating_sub(len) > MAX_ARRAY_GROWTH {
        return Err(ReactiveError::ArrayTooLarge { len, requested });
    }
    Ok(())
}
