//! Dependency sets.
//!
//! A [`Dep`] is the set of effects subscribed to one observable slot: a
//! property of a raw object, or the value of a ref. Sets hold weak references
//! so a subscription never keeps an effect alive; effects hold strong
//! references to the sets they joined so they can leave them on re-run and
//! on stop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::{EffectId, EffectInner, ReactiveEffect};

/// Unique identifier for a dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct DepInner {
    id: DepId,
    subscribers: Mutex<IndexMap<EffectId, Weak<EffectInner>>>,
}

/// A set of subscribed effects, without duplicates, in subscription order.
#[derive(Clone)]
pub struct Dep(Arc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self(Arc::new(DepInner {
            id: DepId::new(),
            subscribers: Mutex::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Subscribe `effect`. Returns false if it was already subscribed.
    pub(crate) fn add(&self, effect: &ReactiveEffect) -> bool {
        let mut subscribers = self.0.subscribers.lock();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.downgrade());
        true
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.0.subscribers.lock().shift_remove(&id);
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.0.subscribers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live subscribers, in subscription order.
    pub fn effects(&self) -> Vec<ReactiveEffect> {
        let subscribers = self.0.subscribers.lock();
        subscribers
            .values()
            .filter_map(ReactiveEffect::upgrade)
            .collect()
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn inert_effect() -> ReactiveEffect {
        ReactiveEffect::new(Arc::new(|| Value::Undefined), None)
    }

    #[test]
    fn dep_ids_are_unique() {
        assert_ne!(Dep::new().id(), Dep::new().id());
    }

    #[test]
    fn dep_has_no_duplicates() {
        let dep = Dep::new();
        let effect = inert_effect();

        assert!(dep.add(&effect));
        assert!(!dep.add(&effect));
        assert_eq!(dep.len(), 1);

        dep.remove(effect.id());
        assert!(dep.is_empty());
    }

    #[test]
    fn dep_does_not_keep_effects_alive() {
        let dep = Dep::new();
        let effect = inert_effect();
        dep.add(&effect);
        assert_eq!(dep.effects().len(), 1);

        drop(effect);
        assert!(dep.effects().is_empty());
    }
}
