//! Worker pool for task execution.
//!
//! Workers block on the job channel, run one routine at a time outside the
//! scheduler lock, and report back over the message channel. Progress and
//! completion are delivered as messages; the dispatcher thread is their only
//! consumer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::task::{TaskContext, TaskId, TaskOutput, TaskRoutine};

/// A dispatched task: the routine plus the context for this attempt
pub(crate) struct Job {
    pub routine: TaskRoutine,
    pub context: TaskContext,
}

/// Worker to dispatcher messages
pub(crate) enum WorkerMessage {
    Progress {
        id: TaskId,
        attempt: u32,
        progress: f32,
    },
    Finished {
        id: TaskId,
        attempt: u32,
        result: Result<TaskOutput, TaskError>,
    },
    /// Sent once by `shutdown` after every worker has exited
    Stop,
}

/// Fixed-size pool of worker threads.
///
/// The pool exits when the job channel disconnects: dropping the scheduler's
/// sender lets every worker finish what is already buffered and return.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Start `num_workers` threads reading from `jobs`
    pub fn spawn(num_workers: usize, jobs: Receiver<Job>) -> std::io::Result<Self> {
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            workers.push(Worker::spawn(id, jobs.clone())?);
        }
        Ok(Self { workers })
    }

    /// Number of worker threads in the pool
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. The job sender must already be dropped.
    pub fn join(self) {
        for worker in self.workers {
            worker.join();
        }
    }
}

/// A single worker thread in the pool.
struct Worker {
    id: usize,
    thread: JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, jobs: Receiver<Job>) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("mediaflow-worker-{}", id))
            .spawn(move || Self::run(id, jobs))?;
        Ok(Self { id, thread })
    }

    fn run(id: usize, jobs: Receiver<Job>) {
        for Job { routine, context } in jobs.iter() {
            let result = if context.token.is_interrupted() {
                // Interrupted between dispatch and pickup
                Err(TaskError::Cancelled)
            } else {
                debug!(worker = id, task_id = context.id, attempt = context.attempt, "running task");
                execute(&routine, &context)
            };

            let _ = context.messages.send(WorkerMessage::Finished {
                id: context.id,
                attempt: context.attempt,
                result,
            });
        }
        debug!(worker = id, "worker exiting");
    }

    fn join(self) {
        if self.thread.join().is_err() {
            warn!(worker = self.id, "worker thread panicked");
        }
    }
}

/// Run a routine, turning a panic into a task error
fn execute(routine: &TaskRoutine, context: &TaskContext) -> Result<TaskOutput, TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| routine(context))) {
        Ok(result) => result,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Default worker count: half the logical CPUs, at least one.
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}
