//! Bounded-concurrency task execution with settled, ordered outcomes.
//!
//! [`run_bounded`] starts `C` lanes. Each lane repeatedly claims the next
//! unclaimed task from a shared cursor and runs the injected worker on it, so
//! a lane that finishes early immediately picks up more work. Outcomes are
//! written into a slot per task and returned in input order.
//!
//! Cancellation is cooperative: once the token fires no lane claims a new
//! task, in-flight tasks finish normally, and every unclaimed task settles as
//! [`TaskFailure::NotStarted`]. The output always has one entry per input.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Why a task did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure<E> {
    /// The worker returned an error.
    Error(E),
    /// The worker panicked; carries the panic message.
    Panicked(String),
    /// The task was never claimed because the run was cancelled.
    NotStarted,
}

impl<E> TaskFailure<E> {
    pub fn is_not_started(&self) -> bool {
        matches!(self, TaskFailure::NotStarted)
    }
}

/// The settled outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<R, E> {
    Fulfilled(R),
    Rejected(TaskFailure<E>),
}

impl<R, E> Settled<R, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn into_result(self) -> Result<R, TaskFailure<E>> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(failure) => Err(failure),
        }
    }
}

/// Number of lanes actually used: `max(1, min(requested, task_count))`.
pub fn effective_concurrency(requested: usize, task_count: usize) -> usize {
    requested.min(task_count).max(1)
}

/// Run `tasks` through `worker` with at most `concurrency` in flight.
///
/// `worker` receives the task's input index alongside the task. Worker errors
/// and panics are captured per task; this function itself never fails.
#[instrument(skip_all, fields(tasks = tasks.len(), concurrency = concurrency))]
pub async fn run_bounded<T, R, E, F, Fut>(
    tasks: Vec<T>,
    concurrency: usize,
    cancel: CancellationToken,
    worker: F,
) -> Vec<Settled<R, E>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }
    let lanes = effective_concurrency(concurrency, total);

    let cursor = Arc::new(Mutex::new(tasks.into_iter().enumerate()));
    let slots: Arc<Mutex<Vec<Option<Settled<R, E>>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let worker = Arc::new(worker);

    let mut join_set = JoinSet::new();
    for lane in 0..lanes {
        let cursor = Arc::clone(&cursor);
        let slots = Arc::clone(&slots);
        let worker = Arc::clone(&worker);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            loop {
                let claimed = {
                    let mut cursor = cursor.lock().await;
                    if cancel.is_cancelled() {
                        None
                    } else {
                        cursor.next()
                    }
                };
                let Some((index, task)) = claimed else {
                    break;
                };
                debug!(lane, index, "task claimed");

                let work = {
                    let worker = Arc::clone(&worker);
                    async move { worker(index, task).await }
                };
                let settled = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(value)) => Settled::Fulfilled(value),
                    Ok(Err(err)) => Settled::Rejected(TaskFailure::Error(err)),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(lane, index, panic = %message, "worker panicked");
                        Settled::Rejected(TaskFailure::Panicked(message))
                    }
                };
                slots.lock().await[index] = Some(settled);
            }
            if cancel.is_cancelled() {
                debug!(lane, "lane stopped claiming after cancellation");
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "executor lane terminated abnormally");
        }
    }

    let slots = std::mem::take(&mut *slots.lock().await);
    let skipped = slots.iter().filter(|s| s.is_none()).count();
    if skipped > 0 {
        debug!(skipped, "unclaimed tasks settled as not started");
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Settled::Rejected(TaskFailure::NotStarted)))
        .collect()
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
