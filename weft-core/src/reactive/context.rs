//! Reactive Context
//!
//! The reactive context tracks which effect is currently running and whether
//! dependency collection is enabled. When a tracked slot is read, the context
//! tells the registry which effect to subscribe.
//!
//! # Implementation
//!
//! We use thread-local stacks. Entering an effect pushes it onto the effect
//! stack and forces tracking on; the returned guard pops both when dropped,
//! so the previous effect and the previous tracking state are restored even
//! when the computation panics.
//!
//! This design supports nested effects: an inner effect collects its own
//! dependencies and never pollutes the outer effect's set.

use std::cell::{Cell, RefCell};

use super::effect::{EffectId, ReactiveEffect};

thread_local! {
    static EFFECT_STACK: RefCell<Vec<ReactiveEffect>> = const { RefCell::new(Vec::new()) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
}

/// Guard that pops the current effect when dropped.
pub struct ReactiveContext {
    effect_id: EffectId,
}

impl ReactiveContext {
    /// Make `effect` the current effect.
    ///
    /// Tracking is enabled for the duration of the context even if the caller
    /// had paused it: an effect's own run must always be able to track.
    pub fn enter(effect: &ReactiveEffect) -> Self {
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect.clone()));
        enable_tracking();

        Self {
            effect_id: effect.id(),
        }
    }

    /// Check if an effect is currently running.
    pub fn is_active() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost running effect, if any.
    pub fn active_effect() -> Option<ReactiveEffect> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    pub fn active_effect_id() -> Option<EffectId> {
        EFFECT_STACK.with(|stack| stack.borrow().last().map(ReactiveEffect::id))
    }

    /// Whether `id` is anywhere on the effect stack.
    pub fn contains(id: EffectId) -> bool {
        EFFECT_STACK.with(|stack| stack.borrow().iter().any(|effect| effect.id() == id))
    }

    pub fn depth() -> usize {
        EFFECT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = EFFECT_STACK.with(|stack| stack.borrow_mut().pop());
        reset_tracking();

        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                effect.id()
            );
        }
    }
}

/// True iff collection is enabled and an effect is running.
pub fn is_tracking() -> bool {
    SHOULD_TRACK.with(Cell::get) && ReactiveContext::is_active()
}

/// Suspend dependency collection until the matching [`reset_tracking`].
pub fn pause_tracking() {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(false));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(previous));
}

/// Force dependency collection on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(true));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(previous));
}

/// Restore the tracking state saved by the last pause or enable.
///
/// An unmatched reset falls back to tracking enabled.
pub fn reset_tracking() {
    let previous = TRACK_STACK.with(|stack| stack.borrow_mut().pop());
    SHOULD_TRACK.with(|flag| flag.set(previous.unwrap_or(true)));
}

/// Pauses tracking for as long as the guard lives.
pub struct PauseGuard {
    _private: (),
}

impl PauseGuard {
    pub fn new() -> Self {
        pause_tracking();
        Self { _private: () }
    }
}

impl Default for PauseGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any dependencies.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _pause = PauseGuard::new();
    f()
}
