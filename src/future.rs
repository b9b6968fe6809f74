//! Single-assignment future over a blocking operation.
//!
//! A [`Future`] runs its operation on a background context and stores the outcome
//! once. Continuations registered with [`Future::on_complete`] are each delivered that
//! outcome exactly once, in registration order, on the future's completion context.
//!
//! One mutex (the completion lock) guards the stored outcome, the continuation queue and
//! the draining mark. The lock is never held while user code runs. At most one drain job
//! exists per future at a time, so every delivery for a future happens in the order the
//! lock admitted the registrations.

use crate::executor::{current_context, default_background, panic_message, ExecutionContext};
use crate::outcome::Try;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

type Continuation<T, E> = Box<dyn FnOnce(&Try<T, E>) + Send + 'static>;

struct CompletionState<T, E>
where
    E: std::error::Error,
{
    result: Option<Arc<Try<T, E>>>,
    pending: VecDeque<Continuation<T, E>>,
    /// Set while a drain job is scheduled or running
    draining: bool,
}

struct Shared<T, E>
where
    E: std::error::Error,
{
    state: Mutex<CompletionState<T, E>>,
    arrival: Condvar,
    completed: AtomicBool,
    completion_context: Arc<dyn ExecutionContext>,
}

/// Handle to the eventual outcome of a background operation.
///
/// Cloning the handle is cheap; every clone observes the same outcome.
pub struct Future<T, E>
where
    E: std::error::Error,
{
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Future<T, E>
where
    E: std::error::Error,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Run `operation` on a new background thread.
    ///
    /// Continuations are delivered on the context this call is made from: the serial
    /// queue running the caller, or inline on whichever thread completes or registers.
    pub fn new<F>(operation: F) -> Self
    where
        F: FnOnce() -> Try<T, E> + Send + 'static,
    {
        Self::spawn_inner(&*default_background(), current_context(), operation)
    }

    /// Run `operation` on a new background thread, delivering continuations on
    /// `completion_context`.
    pub fn with_context<C, F>(completion_context: C, operation: F) -> Self
    where
        C: ExecutionContext + 'static,
        F: FnOnce() -> Try<T, E> + Send + 'static,
    {
        Self::spawn_inner(
            &*default_background(),
            Arc::new(completion_context),
            operation,
        )
    }

    /// Run `operation` on `background`, delivering continuations on `completion_context`.
    pub fn spawn_on<B, C, F>(background: &B, completion_context: C, operation: F) -> Self
    where
        B: ExecutionContext + ?Sized,
        C: ExecutionContext + 'static,
        F: FnOnce() -> Try<T, E> + Send + 'static,
    {
        Self::spawn_inner(background, Arc::new(completion_context), operation)
    }

    /// A future whose outcome is already known. No background job is scheduled.
    pub fn completed<C>(completion_context: C, result: Try<T, E>) -> Self
    where
        C: ExecutionContext + 'static,
    {
        let future = Self::pending(Arc::new(completion_context));
        Shared::complete(&future.shared, result);
        future
    }

    fn pending(completion_context: Arc<dyn ExecutionContext>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CompletionState {
                    result: None,
                    pending: VecDeque::new(),
                    draining: false,
                }),
                arrival: Condvar::new(),
                completed: AtomicBool::new(false),
                completion_context,
            }),
        }
    }

    fn spawn_inner<B, F>(
        background: &B,
        completion_context: Arc<dyn ExecutionContext>,
        operation: F,
    ) -> Self
    where
        B: ExecutionContext + ?Sized,
        F: FnOnce() -> Try<T, E> + Send + 'static,
    {
        let future = Self::pending(completion_context);
        let shared = Arc::clone(&future.shared);
        debug!(
            background = background.label(),
            completion_context = shared.completion_context.label(),
            "Scheduling future operation"
        );

        background.execute(Box::new(move || {
            match catch_unwind(AssertUnwindSafe(operation)) {
                Ok(result) => Shared::complete(&shared, result),
                Err(payload) => error!(
                    panic = panic_message(payload.as_ref()),
                    "Future operation panicked, future will stay pending"
                ),
            }
        }));

        future
    }

    /// Register `continuation` to receive the outcome.
    ///
    /// Never waits for the operation. If the outcome is already stored the continuation
    /// is scheduled on the completion context right away; with an inline context that
    /// means it runs before this call returns.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(&Try<T, E>) + Send + 'static,
    {
        let start_drain = {
            let mut state = self.shared.state.lock();
            state.pending.push_back(Box::new(continuation));
            if state.result.is_some() && !state.draining {
                state.draining = true;
                true
            } else {
                false
            }
        };

        trace!(start_drain, "Registered continuation");
        if start_drain {
            Shared::schedule_drain(&self.shared);
        }
    }

    /// Block until the outcome is stored and return it.
    ///
    /// Blocks forever if the operation never returns.
    pub fn get_result(&self) -> Arc<Try<T, E>> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = &state.result {
                return Arc::clone(result);
            }
            self.shared.arrival.wait(&mut state);
        }
    }

    /// The outcome if it has been stored, without waiting
    pub fn result(&self) -> Option<Arc<Try<T, E>>> {
        self.shared.state.lock().result.clone()
    }

    pub fn has_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Label of the context continuations are delivered on
    pub fn completion_context_label(&self) -> &str {
        self.shared.completion_context.label()
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn complete(this: &Arc<Self>, result: Try<T, E>) {
        let start_drain = {
            let success = result.is_success();
            let mut state = this.state.lock();
            debug_assert!(state.result.is_none(), "future completed twice");
            state.result = Some(Arc::new(result));
            this.completed.store(true, Ordering::Release);
            this.arrival.notify_all();

            debug!(
                queued = state.pending.len(),
                success,
                "Future completed"
            );

            if !state.pending.is_empty() && !state.draining {
                state.draining = true;
                true
            } else {
                false
            }
        };

        if start_drain {
            Self::schedule_drain(this);
        }
    }

    /// Hand a drain job to the completion context. The caller must have set `draining`.
    fn schedule_drain(this: &Arc<Self>) {
        let shared = Arc::clone(this);
        this.completion_context.execute(Box::new(move || shared.drain()));
    }

    /// Deliver queued continuations until the queue is empty, then clear `draining`.
    ///
    /// Continuations appended while this runs, including ones registered by a
    /// continuation on this same future, are picked up by the same loop.
    fn drain(&self) {
        let result = match self.state.lock().result.clone() {
            Some(result) => result,
            None => return,
        };

        let mut delivered = 0usize;
        loop {
            let continuation = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(continuation) => continuation,
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| continuation(result.as_ref())));
            if let Err(payload) = outcome {
                error!(
                    context = self.completion_context.label(),
                    panic = panic_message(payload.as_ref()),
                    "Continuation panicked"
                );
            }
            delivered += 1;
        }

        trace!(
            delivered,
            context = self.completion_context.label(),
            "Drained continuations"
        );
    }
}

impl<T, E> fmt::Debug for Future<T, E>
where
    T: fmt::Debug,
    E: std::error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Formatting `T` is user code, so it runs after the guard is released
        let (result, pending) = {
            let state = self.shared.state.lock();
            (state.result.clone(), state.pending.len())
        };
        f.debug_struct("Future")
            .field("result", &result)
            .field("pending_continuations", &pending)
            .field("completion_context", &self.shared.completion_context.label())
            .finish()
    }
}
