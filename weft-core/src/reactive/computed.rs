//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. The getter runs inside an internal effect whose scheduler does not
//!    recompute. When an upstream slot changes, the scheduler only marks the
//!    computed dirty and notifies the computed's own dependents.
//!
//! 2. Reading the value tracks the read against the computed's dependency
//!    set, then recomputes if dirty.
//!
//! # Why This Matters
//!
//! - A ref changes 10 times
//! - A computed depends on it
//! - Nobody reads the computed in between
//! - The getter runs once on the next read, not 10 times

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::dep::Dep;
use super::effect::{EffectFn, ReactiveEffect, Scheduler};
use super::refs::{Ref, RefImpl};
use super::runtime::{track_effects, trigger_effects};
use crate::error::ReactiveError;
use crate::value::Value;

/// Getter of a computed.
pub type ComputedGetter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Setter of a writable computed.
pub type ComputedSetter = Arc<dyn Fn(Value) + Send + Sync>;

/// Options accepted by [`computed_with`].
#[derive(Default, Clone)]
pub struct ComputedOptions {
    pub get: Option<ComputedGetter>,
    /// Without a setter the computed is read-only.
    pub set: Option<ComputedSetter>,
}

impl fmt::Debug for ComputedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedOptions")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

struct ComputedInner {
    value: RwLock<Value>,
    dirty: AtomicBool,
    dep: Dep,
    effect: ReactiveEffect,
    setter: Option<ComputedSetter>,
}

impl ComputedInner {
    fn read(&self) -> Value {
        track_effects(&self.dep);
        if self.dirty.swap(false, Ordering::SeqCst) {
            let value = self.effect.run();
            *self.value.write() = value;
        }
        self.value.read().clone()
    }
}

impl RefImpl for ComputedInner {
    fn get(&self) -> Value {
        self.read()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => warn!("write operation failed: computed value is readonly"),
        }
    }

    fn dep(&self) -> Option<Dep> {
        Some(self.dep.clone())
    }

    fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }
}

/// A lazily evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed(Arc<ComputedInner>);

impl Computed {
    fn new(getter: ComputedGetter, setter: Option<ComputedSetter>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let weak = weak.clone();
            let scheduler: Scheduler = Arc::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.dirty.swap(true, Ordering::SeqCst) {
                    trigger_effects([inner.dep.clone()]);
                }
            });
            let func: EffectFn = getter;
            ComputedInner {
                value: RwLock::new(Value::Undefined),
                dirty: AtomicBool::new(true),
                dep: Dep::new(),
                effect: ReactiveEffect::new(func, Some(scheduler)),
                setter,
            }
        });
        Self(inner)
    }

    /// Current value, recomputed first if a dependency changed.
    pub fn value(&self) -> Value {
        self.0.read()
    }

    /// Pass `value` to the setter. Without one, the write is ignored.
    pub fn set_value(&self, value: impl Into<Value>) {
        RefImpl::set(&*self.0, value.into());
    }

    pub fn is_readonly(&self) -> bool {
        self.0.setter.is_none()
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.load(Ordering::SeqCst)
    }

    /// The internal effect running the getter.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.0.effect
    }

    /// This computed as a generic ref handle.
    pub fn to_ref(&self) -> Ref {
        Ref::new(self.0.clone())
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("readonly", &self.is_readonly())
            .field("effect", &self.0.effect)
            .finish()
    }
}

/// Read-only computed over `getter`.
pub fn computed<F, R>(getter: F) -> Computed
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    Computed::new(Arc::new(move || getter().into()), None)
}

/// Computed from explicit options. A getter is required.
pub fn computed_with(options: ComputedOptions) -> Result<Computed, ReactiveError> {
    let getter = options.get.ok_or(ReactiveError::MissingGetter)?;
    Ok(Computed::new(getter, options.set))
}
