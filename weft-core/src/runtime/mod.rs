//! Deferred Reactions
//!
//! Everything that runs after the write that caused it: the job scheduler,
//! deep traversal and the watchers built on both.

pub mod scheduler;
mod traverse;
mod watch;

pub use scheduler::{
    flush_jobs, has_pending_jobs, is_flushing, next_tick, queue_job, queue_post_flush_cb,
    queue_pre_flush_cb, JobId, SchedulerJob, RECURSION_LIMIT,
};
pub use traverse::traverse;
pub use watch::{
    watch, watch_effect, watch_effect_with, watch_post_effect, watch_sync_effect, FlushMode,
    OnInvalidate, WatchGetter, WatchHandle, WatchOptions, WatchSource,
};
