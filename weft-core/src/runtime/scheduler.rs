//! Job Scheduler
//!
//! The scheduler defers reactions out of the write that caused them, so that
//! many synchronous writes produce one reaction.
//!
//! # Algorithm
//!
//! Jobs wait in three queues, each deduplicated by job identity while the job
//! is unflushed:
//!
//! 1. Pre-flush callbacks (watchers with the default flush mode)
//! 2. Main jobs, in insertion order
//! 3. Post-flush callbacks (watchers that must observe settled state)
//!
//! A flush drains the queues in that order and repeats until all three are
//! empty, so jobs queued while flushing run in the same flush. A job that
//! keeps re-queueing itself is cut off after [`RECURSION_LIMIT`] runs in one
//! flush.
//!
//! # Threading
//!
//! Queues are thread-local. The host decides when the deferred turn happens
//! by awaiting [`next_tick`] or calling [`flush_jobs`] directly.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

/// Maximum number of times one job may run within a single flush.
pub const RECURSION_LIMIT: usize = 100;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A unit of deferred work. Clones share the identity used for dedupe.
#[derive(Clone)]
pub struct SchedulerJob {
    id: JobId,
    func: Arc<dyn Fn() + Send + Sync>,
}

impl SchedulerJob {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: JobId::new(),
            func: Arc::new(f),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Run the job now, outside any queue.
    pub fn run(&self) {
        (self.func)()
    }
}

impl fmt::Debug for SchedulerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchedulerJob").field(&self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Pre,
    Main,
    Post,
}

#[derive(Default)]
struct JobQueues {
    pre: IndexMap<JobId, SchedulerJob>,
    main: IndexMap<JobId, SchedulerJob>,
    post: IndexMap<JobId, SchedulerJob>,
}

impl JobQueues {
    fn queue_mut(&mut self, kind: QueueKind) -> &mut IndexMap<JobId, SchedulerJob> {
        match kind {
            QueueKind::Pre => &mut self.pre,
            QueueKind::Main => &mut self.main,
            QueueKind::Post => &mut self.post,
        }
    }

    /// Next job in flush order.
    fn pop_next(&mut self) -> Option<SchedulerJob> {
        [QueueKind::Pre, QueueKind::Main, QueueKind::Post]
            .into_iter()
            .find_map(|kind| self.queue_mut(kind).shift_remove_index(0))
            .map(|(_, job)| job)
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.main.is_empty() && self.post.is_empty()
    }
}

thread_local! {
    static QUEUES: RefCell<JobQueues> = RefCell::new(JobQueues::default());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

fn enqueue(kind: QueueKind, job: SchedulerJob) {
    let queued = QUEUES.with(|queues| {
        let mut queues = queues.borrow_mut();
        let queue = queues.queue_mut(kind);
        if queue.contains_key(&job.id) {
            return false;
        }
        queue.insert(job.id, job.clone());
        true
    });
    if queued {
        trace!(job = ?job.id, ?kind, "job queued");
    }
}

/// Queue a main job.
pub fn queue_job(job: SchedulerJob) {
    enqueue(QueueKind::Main, job);
}

/// Queue a job to run before the main jobs of the next flush.
pub fn queue_pre_flush_cb(job: SchedulerJob) {
    enqueue(QueueKind::Pre, job);
}

/// Queue a job to run after the main jobs of the next flush.
pub fn queue_post_flush_cb(job: SchedulerJob) {
    enqueue(QueueKind::Post, job);
}

pub fn has_pending_jobs() -> bool {
    QUEUES.with(|queues| !queues.borrow().is_empty())
}

pub fn is_flushing() -> bool {
    FLUSHING.with(Cell::get)
}

/// Resets the flushing flag even if a job panics.
struct FlushGuard;

impl FlushGuard {
    fn enter() -> Option<Self> {
        if FLUSHING.with(|flag| flag.replace(true)) {
            None
        } else {
            Some(FlushGuard)
        }
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flag| flag.set(false));
    }
}

/// Run every queued job. A flush started from inside a job is a no-op.
pub fn flush_jobs() {
    let Some(_guard) = FlushGuard::enter() else {
        return;
    };

    let mut counts: HashMap<JobId, usize> = HashMap::new();
    let mut ran = 0usize;

    loop {
        let next = QUEUES.with(|queues| queues.borrow_mut().pop_next());
        let Some(job) = next else {
            break;
        };

        let count = counts.entry(job.id).or_default();
        *count += 1;
        if *count > RECURSION_LIMIT {
            warn!(
                job = ?job.id,
                limit = RECURSION_LIMIT,
                "maximum recursive updates exceeded; a reactive effect may be mutating its own dependencies"
            );
            continue;
        }

        job.run();
        ran += 1;
    }

    if ran > 0 {
        debug!(jobs = ran, "flushed jobs");
    }
}

/// Yield to the executor, then flush queued jobs.
///
/// Queues are thread-local, so this must be awaited on the thread that
/// queued the jobs (a current-thread runtime or a `LocalSet`).
pub async fn next_tick() {
    tokio::task::yield_now().await;
    flush_jobs();
}
