//! Weft Core
//!
//! This crate provides the reactivity engine for the Weft UI runtime.
//! It implements:
//!
//! - Reactive proxies over dynamic objects and arrays
//! - Refs, custom refs and lazily cached computeds
//! - Effects with automatic dependency tracking
//! - Batched watchers on a deferred job queue
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Dynamic values, raw objects and property keys
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `runtime`: Job scheduler, deep traversal and watchers
//! - `error`: Errors returned by fallible operations
//!
//! Property access on reactive objects goes through explicit
//! [`Proxy::get`](reactive::Proxy::get) and
//! [`Proxy::set`](reactive::Proxy::set) calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use weft_core::{computed, effect, reactive, ref_};
//!
//! // Create reactive state
//! let state = reactive(json!({ "count": 0 }));
//! let state = state.as_proxy().unwrap().clone();
//!
//! // Create a derived value
//! let doubled = {
//!     let state = state.clone();
//!     computed(move || state.get("count").as_i64().unwrap_or(0) * 2)
//! };
//!
//! // Create an effect
//! let _runner = effect(move || {
//!     println!("Doubled: {:?}", doubled.value());
//! });
//!
//! // Update the state
//! state.set("count", 5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod error;
pub mod reactive;
pub mod runtime;
pub mod value;

pub use error::ReactiveError;
pub use reactive::{
    computed, computed_with, custom_ref, effect, effect_with, is_proxy, is_reactive, is_readonly,
    is_ref, is_shallow, mark_raw, reactive, readonly, ref_, shallow_reactive, shallow_readonly,
    shallow_ref, stop, to_raw, to_ref, to_refs, trigger_ref, unref, Computed, ComputedOptions,
    EffectOptions, EffectRunner, Proxy, Ref,
};
pub use runtime::{
    flush_jobs, next_tick, watch, watch_effect, watch_post_effect, watch_sync_effect, FlushMode,
    OnInvalidate, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{Object, PropKey, Value};
