//! Reactive Runtime
//!
//! The runtime owns the dependency registry, which maps every observed raw
//! object and property key to the [`Dep`] holding the effects that read it.
//!
//! # How It Works
//!
//! 1. When a proxy property is read inside a running effect, [`track`] finds
//!    or creates the dependency set for `(object, key)` and subscribes the
//!    current effect to it.
//!
//! 2. When a proxy property is written, [`trigger`] resolves the affected
//!    dependency sets (the key itself plus the synthetic keys a structural
//!    change invalidates) and notifies every subscribed effect.
//!
//! 3. An effect is never notified by a write it makes while it is running
//!    itself; that would either loop forever or run it twice in one tick.
//!
//! # Thread Safety
//!
//! The registry is a process-wide concurrent map keyed by the raw object's
//! stable id, so every proxy variant over one object shares its
//! bookkeeping. No registry lock is held while effects run.

use std::collections::HashMap;
use std::sync::OnceLock;

use dashmap::DashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::{is_tracking, ReactiveContext};
use super::dep::Dep;
use super::effect::{EffectId, ReactiveEffect};
use crate::value::{Object, ObjectId, PropKey, Value};

/// Kind of read being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of mutation being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
}

type KeyToDep = HashMap<PropKey, Dep>;

static REGISTRY: OnceLock<DashMap<ObjectId, KeyToDep>> = OnceLock::new();

fn registry() -> &'static DashMap<ObjectId, KeyToDep> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Record that the current effect read `key` of `target`.
pub fn track(target: &Object, op: TrackOp, key: &PropKey) {
    if !is_tracking() {
        return;
    }

    let dep = registry()
        .entry(target.id())
        .or_default()
        .entry(key.clone())
        .or_default()
        .clone();

    trace!(object = ?target.id(), ?op, %key, "track");
    track_effects(&dep);
}

/// Subscribe the current effect to `dep`, if tracking.
pub fn track_effects(dep: &Dep) {
    if !is_tracking() {
        return;
    }
    if let Some(effect) = ReactiveContext::active_effect() {
        if dep.add(&effect) {
            effect.push_dep(dep.clone());
        }
    }
}

/// Report a mutation of `key` on `target`.
///
/// `new_value` is only consulted when an array's `length` is set.
pub fn trigger(target: &Object, op: TriggerOp, key: &PropKey, new_value: &Value) {
    let deps: SmallVec<[Dep; 4]> = {
        let Some(key_to_dep) = registry().get(&target.id()) else {
            // never tracked
            return;
        };

        let mut deps = SmallVec::new();
        let is_array = target.is_array();

        if is_array && key.is_length() && op == TriggerOp::Set {
            let new_len = new_value.as_index().unwrap_or(0);
            for (tracked_key, dep) in key_to_dep.iter() {
                let cut = tracked_key.as_index().is_some_and(|index| index >= new_len);
                if tracked_key.is_length() || cut {
                    deps.push(dep.clone());
                }
            }
        } else {
            if let Some(dep) = key_to_dep.get(key) {
                deps.push(dep.clone());
            }

            let structural = match op {
                TriggerOp::Add if is_array => key.is_integer_key().then(PropKey::length),
                TriggerOp::Add | TriggerOp::Delete if !is_array => Some(PropKey::iterate()),
                _ => None,
            };
            if let Some(dep) = structural.and_then(|k| key_to_dep.get(&k)) {
                deps.push(dep.clone());
            }
        }
        deps
    };

    trace!(object = ?target.id(), ?op, %key, deps = deps.len(), "trigger");
    trigger_effects(deps);
}

/// Notify every effect subscribed to any of `deps`.
///
/// Each effect is notified at most once per call, and never while it is the
/// effect currently running.
pub fn trigger_effects<I>(deps: I)
where
    I: IntoIterator<Item = Dep>,
{
    let mut effects: IndexMap<EffectId, ReactiveEffect> = IndexMap::new();
    for dep in deps {
        for effect in dep.effects() {
            effects.entry(effect.id()).or_insert(effect);
        }
    }

    let current = ReactiveContext::active_effect_id();
    for (id, effect) in effects {
        if Some(id) == current || !effect.is_active() {
            continue;
        }
        effect.notify();
    }
}

/// Drop every dependency set recorded for a raw object.
///
/// Runs from the object's `Drop`, so it never initializes the registry.
pub(crate) fn forget_target(id: ObjectId) {
    if let Some(registry) = REGISTRY.get() {
        registry.remove(&id);
    }
}

/// Number of objects with recorded dependencies.
pub fn tracked_target_count() -> usize {
    registry().len()
}

/// Whether any dependency is recorded for `(target, key)`.
pub fn has_dep(target: &Object, key: &PropKey) -> bool {
    registry()
        .get(&target.id())
        .is_some_and(|key_to_dep| key_to_dep.get(key).is_some_and(|dep| !dep.is_empty()))
}
