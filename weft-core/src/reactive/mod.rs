//! Reactive Primitives
//!
//! This module implements the core reactive system: proxies, refs, computeds
//! and effects. These primitives form the foundation of Weft's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Proxy`] is a tracked view over a raw object. Reading a property
//! through a mutable proxy inside an effect registers that effect as a
//! dependent of the property; writing the property notifies its dependents.
//! Nested objects are wrapped lazily as they are read.
//!
//! ## Refs
//!
//! A [`Ref`] is a single observable slot, for values that are not objects or
//! that need to be replaced wholesale.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change, or hands the re-run to a scheduler.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies. When a tracked slot is read, we check whether an effect is
//! running and, if so, subscribe it to the slot's dependency set in the
//! runtime registry.

mod array;
mod computed;
mod context;
mod dep;
mod effect;
mod handlers;
mod proxy;
mod refs;
pub mod runtime;

pub use computed::{computed, computed_with, Computed, ComputedGetter, ComputedOptions, ComputedSetter};
pub use context::{
    enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked, PauseGuard,
    ReactiveContext,
};
pub use dep::{Dep, DepId};
pub use effect::{
    effect, effect_with, stop, EffectFn, EffectId, EffectOptions, EffectRunner, ReactiveEffect,
    Scheduler,
};
pub use proxy::{
    flags, is_proxy, is_reactive, is_readonly, mark_raw, reactive, readonly, shallow_reactive,
    shallow_readonly, to_raw, Proxy, ProxyKind,
};
pub use refs::{
    custom_ref, is_ref, is_shallow, ref_, shallow_ref, to_ref, to_refs, trigger_ref, unref, Ref,
    RefImpl, RefTracker,
};
pub use runtime::{track, trigger, TrackOp, TriggerOp};
