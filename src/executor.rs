//! Execution Contexts
//!
//! Places where jobs run: on the calling thread, on a fresh background thread, on a
//! labelled serial queue, or on a tokio runtime's blocking pool. Futures run their
//! operation on one context and deliver continuations on another.

use crate::config::{BackgroundConfig, QueueConfig};
use crate::error::ExecutorError;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, SendError, Sender};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use tracing::{debug, error, warn};

/// A unit of work handed to an execution context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere jobs can be scheduled.
///
/// `execute` must run every job it accepts exactly once. Whether it runs before
/// `execute` returns is up to the implementation.
pub trait ExecutionContext: Send + Sync {
    fn execute(&self, job: Job);

    /// Short name used in log events
    fn label(&self) -> &str;
}

impl<C> ExecutionContext for Arc<C>
where
    C: ExecutionContext + ?Sized,
{
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

/// Run a job, logging instead of unwinding if it panics.
pub(crate) fn run_guarded(label: &str, job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        error!(
            context = label,
            panic = panic_message(payload.as_ref()),
            "Job panicked"
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Runs each job immediately on the thread that calls `execute`
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl ExecutionContext for Inline {
    fn execute(&self, job: Job) {
        run_guarded("inline", job);
    }

    fn label(&self) -> &str {
        "inline"
    }
}

/// Spawns one named OS thread per job
#[derive(Debug, Clone)]
pub struct ThreadPerTask {
    name_prefix: String,
    stack_size: Option<usize>,
    spawned: Arc<AtomicU64>,
}

impl ThreadPerTask {
    pub fn new() -> Self {
        Self::from_config(&BackgroundConfig::default())
    }

    pub fn from_config(config: &BackgroundConfig) -> Self {
        Self {
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
            spawned: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of jobs handed to this spawner so far
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadPerTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for ThreadPerTask {
    fn execute(&self, job: Job) {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.name_prefix, index);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        // The spawned closure is dropped if the OS refuses the thread, so the job
        // lives in a slot the caller can reclaim.
        let slot = Arc::new(Mutex::new(Some(job)));
        let thread_slot = Arc::clone(&slot);
        let thread_label = self.name_prefix.clone();
        let spawned = builder.spawn(move || {
            let job = thread_slot.lock().take();
            if let Some(job) = job {
                run_guarded(&thread_label, job);
            }
        });

        if let Err(err) = spawned {
            warn!(
                thread = %name,
                error = %err,
                "Failed to spawn background thread, running job on caller"
            );
            let job = slot.lock().take();
            if let Some(job) = job {
                run_guarded(&self.name_prefix, job);
            }
        }
    }

    fn label(&self) -> &str {
        &self.name_prefix
    }
}

/// Process-wide spawner used by [`crate::Future::new`] for operations
pub fn default_background() -> Arc<ThreadPerTask> {
    static DEFAULT_BACKGROUND: OnceLock<Arc<ThreadPerTask>> = OnceLock::new();
    Arc::clone(DEFAULT_BACKGROUND.get_or_init(|| Arc::new(ThreadPerTask::new())))
}

struct QueueShared {
    label: String,
    sender: Sender<Job>,
}

thread_local! {
    static CURRENT_QUEUE: RefCell<Option<Weak<QueueShared>>> = RefCell::new(None);
}

/// FIFO queue served by one dedicated worker thread.
///
/// Jobs run one at a time in submission order. Handles are cheap to clone; the worker
/// exits once every handle is gone and the backlog has run.
#[derive(Clone)]
pub struct SerialQueue {
    shared: Arc<QueueShared>,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> Result<Self, ExecutorError> {
        let label = label.into();
        let (sender, receiver) = channel::<Job>();
        let shared = Arc::new(QueueShared {
            label: label.clone(),
            sender,
        });

        let worker_ref = Arc::downgrade(&shared);
        let worker_label = label.clone();
        thread::Builder::new()
            .name(format!("queue-{}", label))
            .spawn(move || {
                CURRENT_QUEUE.with(|current| *current.borrow_mut() = Some(worker_ref));
                while let Ok(job) = receiver.recv() {
                    run_guarded(&worker_label, job);
                }
                debug!(queue = %worker_label, "Serial queue worker exiting");
            })
            .map_err(|source| ExecutorError::Spawn {
                label: label.clone(),
                source,
            })?;

        debug!(queue = %label, "Serial queue started");
        Ok(Self { shared })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, ExecutorError> {
        Self::new(config.default_label.clone())
    }

    /// Whether the calling thread is this queue's worker
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE.with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&self.shared)))
                .unwrap_or(false)
        })
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.shared.label)
            .finish()
    }
}

impl ExecutionContext for SerialQueue {
    fn execute(&self, job: Job) {
        if let Err(SendError(job)) = self.shared.sender.send(job) {
            warn!(
                queue = %self.shared.label,
                "Serial queue worker has stopped, running job on caller"
            );
            run_guarded(&self.shared.label, job);
        }
    }

    fn label(&self) -> &str {
        &self.shared.label
    }
}

/// Runs jobs on the runtime's blocking pool
impl ExecutionContext for tokio::runtime::Handle {
    fn execute(&self, job: Job) {
        drop(self.spawn_blocking(move || run_guarded("tokio-blocking", job)));
    }

    fn label(&self) -> &str {
        "tokio-blocking"
    }
}

/// The context the calling code is running on: the serial queue whose worker is the
/// current thread, or [`Inline`] anywhere else.
pub fn current_context() -> Arc<dyn ExecutionContext> {
    let queue = CURRENT_QUEUE.with(|current| current.borrow().as_ref().and_then(Weak::upgrade));
    match queue {
        Some(shared) => Arc::new(SerialQueue { shared }),
        None => Arc::new(Inline),
    }
}
