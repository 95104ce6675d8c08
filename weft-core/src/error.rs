//! Error types for the reactive engine.
//!
//! The engine is permissive by default: writes to read-only views, deletes on
//! read-only views and wrapping non-objects all degrade to no-ops. Errors are
//! reserved for API misuse that has no sensible fallback.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    #[error("Computed value requires a getter")]
    MissingGetter,

    #[error("Array operation on a non-array target. operation: {operation}")]
    NotAnArray { operation: &'static str },

    #[error("Array cannot grow from {len} to {requested} slots")]
    ArrayTooLarge { len: usize, requested: usize },
}
