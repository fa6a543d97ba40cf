//! Scheduler error types

use crate::task::{TaskId, TaskKind, TaskStatus};

/// A task rejected before it entered the queue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("no routine supplied or registered for {kind} tasks")]
    NoRoutine { kind: TaskKind },

    #[error("task input reference is empty")]
    EmptyInput,

    #[error("scheduler is shut down")]
    ShutDown,
}

/// Structural error returned synchronously by scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("cannot {operation} task {id} while it is {status}")]
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error reported by a task routine
///
/// Never returned from `submit`; it is recorded on the task and observed
/// through `status` and the progress stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The routine observed a cancel or pause request and stopped early
    #[error("task interrupted")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("task routine panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Routine failure with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl serde::Serialize for TaskError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}
