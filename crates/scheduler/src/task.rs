//! Task descriptors and the context handed to task routines

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::TaskError;
use crate::worker::WorkerMessage;

/// Unique task identifier, assigned at submission
pub type TaskId = u64;

/// Kind of background work
///
/// Selects the routine registered for the task; the scheduler itself treats
/// every kind the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Export,
    ProxyGeneration,
    ThumbnailGeneration,
    WaveformExtraction,
    FrameCache,
    Transcode,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Export,
        TaskKind::ProxyGeneration,
        TaskKind::ThumbnailGeneration,
        TaskKind::WaveformExtraction,
        TaskKind::FrameCache,
        TaskKind::Transcode,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Export => "export",
            TaskKind::ProxyGeneration => "proxy_generation",
            TaskKind::ThumbnailGeneration => "thumbnail_generation",
            TaskKind::WaveformExtraction => "waveform_extraction",
            TaskKind::FrameCache => "frame_cache",
            TaskKind::Transcode => "transcode",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels
///
/// Higher values are dispatched first. Priority only affects queue position;
/// a running task is never preempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        };
        f.write_str(name)
    }
}

/// Task lifecycle state
///
/// ```text
/// Pending -> Queued -> Processing -> Completed | Failed | Cancelled | Paused
/// Paused -> Queued (resume)        Failed -> Queued (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet placed in the queue
    Pending,
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What a successful routine produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Reference to the produced artifact, if any
    pub path: Option<PathBuf>,
}

impl TaskOutput {
    /// Result with no output file
    pub fn none() -> Self {
        Self::default()
    }

    /// Result written to `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

/// Work routine executed on a worker thread
///
/// Invoked at most once per dispatch. It should poll
/// [`TaskContext::check_cancelled`] between units of work and push progress
/// through [`TaskContext::report_progress`].
pub type TaskRoutine = Arc<dyn Fn(&TaskContext) -> Result<TaskOutput, TaskError> + Send + Sync>;

/// A unit of work to submit
///
/// # Example
///
/// ```
/// use mediaflow_scheduler::{RenderTask, TaskKind, TaskOutput, TaskPriority};
///
/// let task = RenderTask::new(TaskKind::ThumbnailGeneration, "media/clip-01.mov")
///     .with_priority(TaskPriority::High)
///     .with_output("cache/thumbs/clip-01.png")
///     .with_routine(|ctx| {
///         ctx.check_cancelled()?;
///         ctx.report_progress(1.0);
///         Ok(TaskOutput::at(ctx.output().unwrap_or(ctx.input())))
///     });
///
/// assert_eq!(task.priority(), TaskPriority::High);
/// ```
#[derive(Clone)]
pub struct RenderTask {
    pub(crate) kind: TaskKind,
    pub(crate) priority: TaskPriority,
    pub(crate) input: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) settings: serde_json::Value,
    pub(crate) routine: Option<TaskRoutine>,
}

impl RenderTask {
    /// Create a task of `kind` reading from `input`
    pub fn new(kind: TaskKind, input: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            priority: TaskPriority::Normal,
            input: input.into(),
            output: None,
            settings: serde_json::Value::Null,
            routine: None,
        }
    }

    /// Sets the dispatch priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the output path handed to the routine
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Attach opaque, routine-specific settings
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Use this routine instead of the one registered for the task's kind
    pub fn with_routine<F>(mut self, routine: F) -> Self
    where
        F: Fn(&TaskContext) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    {
        self.routine = Some(Arc::new(routine));
        self
    }

    /// Kind of work
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Dispatch priority
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Input path
    pub fn input(&self) -> &Path {
        &self.input
    }
}

impl fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTask")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("has_routine", &self.routine.is_some())
            .finish()
    }
}

/// Handle passed to a routine for one dispatch of a task
pub struct TaskContext {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) priority: TaskPriority,
    pub(crate) input: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) settings: serde_json::Value,
    pub(crate) attempt: u32,
    pub(crate) token: CancellationToken,
    pub(crate) messages: Sender<WorkerMessage>,
}

impl TaskContext {
    /// Id of the running task
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Kind of work
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Dispatch priority
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Input path
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Output path, if one was set
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Opaque per-task settings
    pub fn settings(&self) -> &serde_json::Value {
        &self.settings
    }

    /// 1 on first dispatch, incremented on every resume or retry
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the task is being cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task was asked to pause
    pub fn is_pause_requested(&self) -> bool {
        self.token.is_pause_requested()
    }

    /// `Err(TaskError::Cancelled)` once a cancel or pause is pending.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.token.is_interrupted() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report progress in [0, 1]. Values are clamped; NaN and infinities are
    /// ignored. The scheduler keeps the maximum reported value.
    pub fn report_progress(&self, progress: f32) {
        if !progress.is_finite() {
            return;
        }
        let _ = self.messages.send(WorkerMessage::Progress {
            id: self.id,
            attempt: self.attempt,
            progress: progress.clamp(0.0, 1.0),
        });
    }
}

/// Read-only snapshot of a task record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub progress: f32,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub error: Option<TaskError>,
    pub attempt: u32,
    pub submitted_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
}

/// Filter for [`crate::TaskScheduler::list_tasks`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub kind: Option<TaskKind>,
    pub min_priority: Option<TaskPriority>,
}

impl TaskFilter {
    /// Filter matching every task
    pub fn all() -> Self {
        Self::default()
    }

    /// Only tasks in `status`
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Only tasks of `kind`
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only tasks at or above `priority`
    pub fn with_min_priority(mut self, priority: TaskPriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    /// Whether `summary` passes every set criterion
    pub fn matches(&self, summary: &TaskSummary) -> bool {
        self.status.map_or(true, |status| summary.status == status)
            && self.kind.map_or(true, |kind| summary.kind == kind)
            && self
                .min_priority
                .map_or(true, |priority| summary.priority >= priority)
    }
}

/// Status or progress change of a task, pushed to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: f32,
    pub error: Option<TaskError>,
}
