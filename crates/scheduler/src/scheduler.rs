//! Task scheduler implementation
//!
//! All task records, the pending queue and the active count live behind one
//! lock. Routines run on the worker pool outside that lock; their progress and
//! results come back over a channel consumed by a single dispatcher thread,
//! which applies status transitions and refills free slots.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationToken, Interrupt};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SubmissionError, TaskError};
use crate::priority::PendingQueue;
use crate::task::{
    RenderTask, TaskContext, TaskEvent, TaskFilter, TaskId, TaskKind, TaskOutput, TaskPriority,
    TaskRoutine, TaskStatus, TaskSummary,
};
use crate::worker::{Job, WorkerMessage, WorkerPool};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Total tasks accepted by `submit`
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    /// Tasks currently waiting in the queue
    pub queued: usize,
    /// Tasks currently holding a concurrency slot
    pub active: usize,
    pub max_concurrent: usize,
}

impl SchedulerStats {
    /// Tasks queued or running
    pub fn in_flight(&self) -> usize {
        self.queued + self.active
    }
}

/// Result of a successful `cancel` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task is now Cancelled
    Cancelled,
    /// The task is running; it becomes Cancelled when its routine returns
    Requested,
}

/// Canonical record of a task; never handed out by reference
struct TaskRecord {
    id: TaskId,
    kind: TaskKind,
    priority: TaskPriority,
    input: std::path::PathBuf,
    output: Option<std::path::PathBuf>,
    settings: serde_json::Value,
    routine: TaskRoutine,
    status: TaskStatus,
    progress: f32,
    error: Option<TaskError>,
    result: Option<TaskOutput>,
    attempt: u32,
    token: CancellationToken,
    submitted_at: SystemTime,
    started_at: Option<SystemTime>,
    ended_at: Option<SystemTime>,
}

impl TaskRecord {
    fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            kind: self.kind,
            priority: self.priority,
            status: self.status,
            progress: self.progress,
            input: self.input.clone(),
            output: self
                .result
                .as_ref()
                .and_then(|result| result.path.clone())
                .or_else(|| self.output.clone()),
            error: self.error.clone(),
            attempt: self.attempt,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    fn event(&self) -> TaskEvent {
        TaskEvent {
            id: self.id,
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
        }
    }

    fn invalid(&self, operation: &'static str) -> SchedulerError {
        SchedulerError::InvalidState {
            id: self.id,
            status: self.status,
            operation,
        }
    }
}

struct Subscriber {
    /// `None` receives events for every task
    task: Option<TaskId>,
    sender: Sender<TaskEvent>,
}

/// How a dispatch ended, after weighing pending interrupt requests
enum Settled {
    Completed(TaskOutput),
    Failed(TaskError),
    Paused,
    Cancelled,
}

fn settle(interrupt: Interrupt, result: Result<TaskOutput, TaskError>) -> Settled {
    match (interrupt, result) {
        (Interrupt::Cancel, _) => Settled::Cancelled,
        (_, Ok(output)) => Settled::Completed(output),
        // The routine stopped in answer to the pause request
        (Interrupt::Pause, Err(TaskError::Cancelled)) => Settled::Paused,
        // Only `cancel` produces Cancelled; a routine reporting it unasked has failed
        (Interrupt::None, Err(TaskError::Cancelled)) => Settled::Failed(TaskError::failed(
            "routine stopped without a cancel or pause request",
        )),
        (_, Err(err)) => Settled::Failed(err),
    }
}

struct SchedulerState {
    tasks: BTreeMap<TaskId, TaskRecord>,
    queue: PendingQueue,
    routines: HashMap<TaskKind, TaskRoutine>,
    active: usize,
    max_concurrent: usize,
    next_id: TaskId,
    /// Dropped on shutdown, which lets the workers drain and exit
    jobs: Option<Sender<Job>>,
    subscribers: Vec<Subscriber>,
    stats: SchedulerStats,
    shut_down: bool,
}

impl SchedulerState {
    fn record(&self, id: TaskId) -> Result<&TaskRecord, SchedulerError> {
        self.tasks.get(&id).ok_or(SchedulerError::UnknownTask(id))
    }

    fn record_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, SchedulerError> {
        self.tasks
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))
    }

    /// Push the task's current snapshot to its subscribers
    fn publish(&mut self, id: TaskId) {
        let Some(event) = self.tasks.get(&id).map(TaskRecord::event) else {
            return;
        };
        let terminal = event.status.is_terminal();
        self.subscribers.retain(|subscriber| match subscriber.task {
            None => subscriber.sender.send(event.clone()).is_ok(),
            Some(task) if task == id => subscriber.sender.send(event.clone()).is_ok() && !terminal,
            Some(_) => true,
        });
    }

    /// Place a task at the back of its priority band
    fn enqueue(&mut self, id: TaskId) {
        if let Some(record) = self.tasks.get_mut(&id) {
            record.status = TaskStatus::Queued;
            self.queue.push(id, record.priority);
            self.publish(id);
        }
    }

    /// Mark a task that is not running as Cancelled
    fn cancel_idle(&mut self, id: TaskId) {
        if let Some(record) = self.tasks.get_mut(&id) {
            record.status = TaskStatus::Cancelled;
            record.ended_at = Some(SystemTime::now());
            self.stats.cancelled += 1;
            info!(task_id = id, kind = %record.kind, "task cancelled");
            self.publish(id);
        }
    }

    /// Cancel queued tasks matching a predicate; returns them in dispatch order
    fn cancel_queued_if<F>(&mut self, predicate: F) -> Vec<TaskId>
    where
        F: Fn(&crate::priority::QueueEntry) -> bool,
    {
        let ids: Vec<TaskId> = self
            .queue
            .remove_if(predicate)
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        for &id in &ids {
            self.cancel_idle(id);
        }
        ids
    }

    /// Dispatch queued tasks while slots are free
    fn pump(&mut self, messages: &Sender<WorkerMessage>) {
        let Some(jobs) = self.jobs.clone() else {
            return;
        };

        while self.active < self.max_concurrent {
            let Some(entry) = self.queue.pop() else {
                break;
            };
            let Some(record) = self.tasks.get_mut(&entry.id) else {
                continue;
            };
            if record.status != TaskStatus::Queued {
                continue;
            }

            record.status = TaskStatus::Processing;
            record.attempt += 1;
            record.token = CancellationToken::new();
            record.started_at.get_or_insert_with(SystemTime::now);

            let job = Job {
                routine: record.routine.clone(),
                context: TaskContext {
                    id: record.id,
                    kind: record.kind,
                    priority: record.priority,
                    input: record.input.clone(),
                    output: record.output.clone(),
                    settings: record.settings.clone(),
                    attempt: record.attempt,
                    token: record.token.clone(),
                    messages: messages.clone(),
                },
            };
            debug!(task_id = entry.id, attempt = record.attempt, priority = %record.priority, "dispatching task");

            if jobs.send(job).is_err() {
                record.status = TaskStatus::Failed;
                record.error = Some(TaskError::failed("worker pool is not running"));
                record.ended_at = Some(SystemTime::now());
                self.stats.failed += 1;
                warn!(task_id = entry.id, "no worker available to run task");
            } else {
                self.active += 1;
            }
            self.publish(entry.id);
        }
    }

    fn on_progress(&mut self, id: TaskId, attempt: u32, progress: f32) {
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        if record.status == TaskStatus::Processing
            && record.attempt == attempt
            && progress > record.progress
        {
            record.progress = progress;
            self.publish(id);
        }
    }

    fn on_finished(&mut self, id: TaskId, attempt: u32, result: Result<TaskOutput, TaskError>) {
        self.active = self.active.saturating_sub(1);

        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        if record.status != TaskStatus::Processing || record.attempt != attempt {
            debug!(task_id = id, attempt, "ignoring stale completion");
            return;
        }

        match settle(record.token.interrupt(), result) {
            Settled::Completed(output) => {
                record.status = TaskStatus::Completed;
                record.progress = 1.0;
                record.result = Some(output);
                record.ended_at = Some(SystemTime::now());
                self.stats.completed += 1;
                info!(task_id = id, kind = %record.kind, attempt, "task completed");
            }
            Settled::Failed(err) => {
                warn!(task_id = id, kind = %record.kind, attempt, error = %err, "task failed");
                record.status = TaskStatus::Failed;
                record.error = Some(err);
                record.ended_at = Some(SystemTime::now());
                self.stats.failed += 1;
            }
            Settled::Paused => {
                record.status = TaskStatus::Paused;
                info!(task_id = id, kind = %record.kind, progress = record.progress, "task paused");
            }
            Settled::Cancelled => {
                record.status = TaskStatus::Cancelled;
                record.ended_at = Some(SystemTime::now());
                self.stats.cancelled += 1;
                info!(task_id = id, kind = %record.kind, "running task cancelled");
            }
        }
        self.publish(id);
    }
}

struct Threads {
    pool: WorkerPool,
    dispatcher: JoinHandle<()>,
}

struct Shared {
    state: Mutex<SchedulerState>,
    /// Signalled after every state change, for the `wait_*` helpers
    changed: Condvar,
    messages: Sender<WorkerMessage>,
    threads: Mutex<Option<Threads>>,
}

impl Shared {
    fn handle(&self, message: WorkerMessage) {
        let mut state = self.state.lock();
        match message {
            WorkerMessage::Progress {
                id,
                attempt,
                progress,
            } => state.on_progress(id, attempt, progress),
            WorkerMessage::Finished {
                id,
                attempt,
                result,
            } => {
                state.on_finished(id, attempt, result);
                state.pump(&self.messages);
            }
            WorkerMessage::Stop => {}
        }
        drop(state);
        self.changed.notify_all();
    }
}

/// Consume worker messages until shutdown or until the scheduler is dropped
fn dispatch_loop(shared: Weak<Shared>, messages: Receiver<WorkerMessage>) {
    for message in messages.iter() {
        if matches!(message, WorkerMessage::Stop) {
            break;
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle(message);
    }
    debug!("dispatcher exiting");
}

/// Bounded-concurrency background task scheduler
///
/// Cloning is cheap; every clone drives the same queue and worker pool.
/// Routines run on `max_concurrent_tasks` worker threads and never under the
/// scheduler lock.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mediaflow_scheduler::{
///     RenderTask, SchedulerConfig, TaskKind, TaskOutput, TaskScheduler, TaskStatus,
/// };
///
/// let scheduler = TaskScheduler::new(SchedulerConfig::new(2)).unwrap();
/// scheduler.register_routine(TaskKind::WaveformExtraction, |ctx| {
///     for step in 1..=4 {
///         ctx.check_cancelled()?;
///         ctx.report_progress(step as f32 / 4.0);
///     }
///     Ok(TaskOutput::none())
/// });
///
/// let id = scheduler
///     .submit(RenderTask::new(TaskKind::WaveformExtraction, "audio/take-3.wav"))
///     .unwrap();
///
/// let summary = scheduler.wait_for(id, Duration::from_secs(5)).unwrap();
/// assert_eq!(summary.status, TaskStatus::Completed);
/// assert_eq!(summary.progress, 1.0);
///
/// scheduler.shutdown();
/// ```
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// Start a scheduler with its worker pool and dispatcher thread
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let max_concurrent = config.effective_max();
        let (job_tx, job_rx) = unbounded();
        let (message_tx, message_rx) = unbounded();

        let pool = WorkerPool::spawn(max_concurrent, job_rx).map_err(SchedulerError::Spawn)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                tasks: BTreeMap::new(),
                queue: PendingQueue::new(),
                routines: HashMap::new(),
                active: 0,
                max_concurrent,
                next_id: 1,
                jobs: Some(job_tx),
                subscribers: Vec::new(),
                stats: SchedulerStats {
                    max_concurrent,
                    ..SchedulerStats::default()
                },
                shut_down: false,
            }),
            changed: Condvar::new(),
            messages: message_tx,
            threads: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        let dispatcher = thread::Builder::new()
            .name("mediaflow-dispatcher".to_string())
            .spawn(move || dispatch_loop(weak, message_rx))
            .map_err(SchedulerError::Spawn)?;

        info!(max_concurrent, workers = pool.num_workers(), "task scheduler started");
        *shared.threads.lock() = Some(Threads { pool, dispatcher });

        Ok(Self { shared })
    }

    /// Register the routine used for tasks of `kind` submitted without one
    pub fn register_routine<F>(&self, kind: TaskKind, routine: F)
    where
        F: Fn(&TaskContext) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    {
        self.shared.state.lock().routines.insert(kind, Arc::new(routine));
    }

    /// Accept a task and queue it. Never blocks on execution capacity.
    pub fn submit(&self, task: RenderTask) -> Result<TaskId, SubmissionError> {
        if task.input.as_os_str().is_empty() {
            return Err(SubmissionError::EmptyInput);
        }

        let mut state = self.shared.state.lock();
        if state.shut_down {
            return Err(SubmissionError::ShutDown);
        }

        let routine = match task.routine {
            Some(routine) => routine,
            None => state
                .routines
                .get(&task.kind)
                .cloned()
                .ok_or(SubmissionError::NoRoutine { kind: task.kind })?,
        };

        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert(
            id,
            TaskRecord {
                id,
                kind: task.kind,
                priority: task.priority,
                input: task.input,
                output: task.output,
                settings: task.settings,
                routine,
                status: TaskStatus::Pending,
                progress: 0.0,
                error: None,
                result: None,
                attempt: 0,
                token: CancellationToken::new(),
                submitted_at: SystemTime::now(),
                started_at: None,
                ended_at: None,
            },
        );
        state.stats.submitted += 1;
        debug!(task_id = id, kind = %task.kind, priority = %task.priority, "task submitted");

        state.enqueue(id);
        state.pump(&self.shared.messages);
        drop(state);
        self.shared.changed.notify_all();

        Ok(id)
    }

    /// Cancel a task.
    ///
    /// Queued and Paused tasks are cancelled immediately and never run again.
    /// A Processing task is asked to stop; it keeps its slot until the routine
    /// returns and then becomes Cancelled.
    pub fn cancel(&self, id: TaskId) -> Result<CancelOutcome, SchedulerError> {
        let mut state = self.shared.state.lock();
        let status = state.record(id)?.status;

        let outcome = match status {
            TaskStatus::Pending | TaskStatus::Queued => {
                state.queue.remove(id);
                state.cancel_idle(id);
                CancelOutcome::Cancelled
            }
            TaskStatus::Paused => {
                state.cancel_idle(id);
                CancelOutcome::Cancelled
            }
            TaskStatus::Processing => {
                state.record(id)?.token.cancel();
                debug!(task_id = id, "cancellation requested");
                CancelOutcome::Requested
            }
            _ => {
                return Err(SchedulerError::InvalidState {
                    id,
                    status,
                    operation: "cancel",
                })
            }
        };
        drop(state);
        self.shared.changed.notify_all();

        Ok(outcome)
    }

    /// Ask a Processing task to pause.
    ///
    /// The routine sees the request through its context. If it stops with
    /// `TaskError::Cancelled` the task becomes Paused with its progress kept.
    /// Any other error fails the task; running to the end completes it.
    pub fn pause(&self, id: TaskId) -> Result<(), SchedulerError> {
        let state = self.shared.state.lock();
        let record = state.record(id)?;

        if record.status != TaskStatus::Processing || !record.token.request_pause() {
            return Err(record.invalid("pause"));
        }
        debug!(task_id = id, "pause requested");
        Ok(())
    }

    /// Move a Paused task back into the queue
    pub fn resume(&self, id: TaskId) -> Result<(), SchedulerError> {
        let mut state = self.shared.state.lock();
        {
            let record = state.record(id)?;
            if record.status != TaskStatus::Paused {
                return Err(record.invalid("resume"));
            }
        }

        info!(task_id = id, "task resumed");
        state.enqueue(id);
        state.pump(&self.shared.messages);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Re-queue a Failed task at its original priority, clearing its error
    /// and progress
    pub fn retry(&self, id: TaskId) -> Result<(), SchedulerError> {
        let mut state = self.shared.state.lock();
        {
            let record = state.record_mut(id)?;
            if record.status != TaskStatus::Failed {
                return Err(record.invalid("retry"));
            }
            record.progress = 0.0;
            record.error = None;
            record.result = None;
            record.started_at = None;
            record.ended_at = None;
        }
        state.stats.retried += 1;
        info!(task_id = id, "task retried");

        state.enqueue(id);
        state.pump(&self.shared.messages);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Cancel every queued task; returns their ids in dispatch order
    pub fn cancel_all_queued(&self) -> Vec<TaskId> {
        let mut state = self.shared.state.lock();
        let cancelled = state.cancel_queued_if(|_| true);
        drop(state);
        self.shared.changed.notify_all();
        cancelled
    }

    /// Shed queued work.
    ///
    /// Among queued tasks at or below `ceiling` priority, keeps the first `cap`
    /// in dispatch order and cancels the rest. Running tasks are untouched.
    pub fn trim_queue(&self, cap: usize, ceiling: TaskPriority) -> Vec<TaskId> {
        let mut state = self.shared.state.lock();
        let doomed: HashSet<TaskId> = state
            .queue
            .ordered()
            .into_iter()
            .filter(|entry| entry.priority <= ceiling)
            .skip(cap)
            .map(|entry| entry.id)
            .collect();

        let cancelled = if doomed.is_empty() {
            Vec::new()
        } else {
            state.cancel_queued_if(|entry| doomed.contains(&entry.id))
        };
        drop(state);

        if !cancelled.is_empty() {
            info!(cancelled = cancelled.len(), cap, ceiling = %ceiling, "trimmed task queue");
            self.shared.changed.notify_all();
        }
        cancelled
    }

    /// Drop the record of a finished task
    pub fn remove(&self, id: TaskId) -> Result<TaskSummary, SchedulerError> {
        let mut state = self.shared.state.lock();
        let record = state.record(id)?;
        if !record.status.is_terminal() {
            return Err(record.invalid("remove"));
        }
        state
            .tasks
            .remove(&id)
            .map(|record| record.summary())
            .ok_or(SchedulerError::UnknownTask(id))
    }

    /// Drop every Completed, Failed and Cancelled record; returns how many
    pub fn clear_finished(&self) -> usize {
        let mut state = self.shared.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|_, record| !record.status.is_terminal());
        before - state.tasks.len()
    }

    /// Current status of a task
    pub fn status(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        Ok(self.shared.state.lock().record(id)?.status)
    }

    /// Snapshot of a task's record
    pub fn summary(&self, id: TaskId) -> Result<TaskSummary, SchedulerError> {
        Ok(self.shared.state.lock().record(id)?.summary())
    }

    /// Snapshots of all tasks matching `filter`, in submission order
    pub fn list_tasks(&self, filter: TaskFilter) -> Vec<TaskSummary> {
        self.shared
            .state
            .lock()
            .tasks
            .values()
            .map(TaskRecord::summary)
            .filter(|summary| filter.matches(summary))
            .collect()
    }

    /// Stream of status and progress updates for one task.
    ///
    /// The current snapshot is delivered first. The stream closes after the
    /// task reaches a terminal status.
    pub fn progress_stream(&self, id: TaskId) -> Result<Receiver<TaskEvent>, SchedulerError> {
        let mut state = self.shared.state.lock();
        let event = state.record(id)?.event();
        let terminal = event.status.is_terminal();

        let (sender, receiver) = unbounded();
        let _ = sender.send(event);
        if !terminal {
            state.subscribers.push(Subscriber {
                task: Some(id),
                sender,
            });
        }
        Ok(receiver)
    }

    /// Stream of updates for every task
    pub fn events(&self) -> Receiver<TaskEvent> {
        let (sender, receiver) = unbounded();
        self.shared.state.lock().subscribers.push(Subscriber { task: None, sender });
        receiver
    }

    /// Counters and current queue depth
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            queued: state.queue.len(),
            active: state.active,
            ..state.stats.clone()
        }
    }

    /// Maximum number of tasks processed at once
    pub fn max_concurrent(&self) -> usize {
        self.shared.state.lock().max_concurrent
    }

    /// Block until `predicate` holds for the task or `timeout` elapses.
    ///
    /// Returns the matching snapshot, or `None` on timeout or unknown id.
    pub fn wait_until<P>(&self, id: TaskId, timeout: Duration, predicate: P) -> Option<TaskSummary>
    where
        P: Fn(&TaskSummary) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            let summary = state.tasks.get(&id)?.summary();
            if predicate(&summary) {
                return Some(summary);
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                let summary = state.tasks.get(&id)?.summary();
                return predicate(&summary).then_some(summary);
            }
        }
    }

    /// Block until the task is Completed, Failed or Cancelled
    pub fn wait_for(&self, id: TaskId, timeout: Duration) -> Option<TaskSummary> {
        self.wait_until(id, timeout, |summary| summary.status.is_terminal())
    }

    /// Block until nothing is queued or running; returns false on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.queue.is_empty() && state.active == 0 {
                return true;
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.queue.is_empty() && state.active == 0;
            }
        }
    }

    /// Stop the scheduler.
    ///
    /// Rejects further submissions, cancels queued and paused tasks, asks
    /// running routines to stop, then joins the worker and dispatcher
    /// threads. Must not be called from inside a task routine.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if !state.shut_down {
            state.shut_down = true;
            let queued = state.cancel_queued_if(|_| true);

            let paused: Vec<TaskId> = state
                .tasks
                .values()
                .filter(|record| record.status == TaskStatus::Paused)
                .map(|record| record.id)
                .collect();
            for id in paused {
                state.cancel_idle(id);
            }
            for record in state.tasks.values() {
                if record.status == TaskStatus::Processing {
                    record.token.cancel();
                }
            }

            state.jobs = None;
            info!(cancelled = queued.len(), running = state.active, "task scheduler shutting down");
        }
        drop(state);
        self.shared.changed.notify_all();

        let threads = self.shared.threads.lock().take();
        if let Some(Threads { pool, dispatcher }) = threads {
            pool.join();
            let _ = self.shared.messages.send(WorkerMessage::Stop);
            if dispatcher.join().is_err() {
                warn!("dispatcher thread panicked");
            }
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }
}
