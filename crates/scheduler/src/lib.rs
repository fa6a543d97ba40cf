//! Mediaflow Scheduler Library
//!
//! Bounded-concurrency background task scheduler for media work (exports,
//! proxies, thumbnails, waveforms, frame caches, transcodes).
//!
//! Tasks are dispatched in priority order with FIFO ordering within each
//! priority level. At most `max_concurrent_tasks` routines run at once, each
//! on a worker thread. Running tasks are never preempted; cancel and pause
//! are cooperative requests the routine polls through its [`TaskContext`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mediaflow_scheduler::{
//!     RenderTask, SchedulerConfig, TaskKind, TaskOutput, TaskPriority, TaskScheduler, TaskStatus,
//! };
//!
//! let scheduler = TaskScheduler::new(SchedulerConfig::new(1)).unwrap();
//!
//! let id = scheduler
//!     .submit(
//!         RenderTask::new(TaskKind::Transcode, "media/interview.mov")
//!             .with_priority(TaskPriority::High)
//!             .with_output("renders/interview.mp4")
//!             .with_routine(|ctx| {
//!                 for chunk in 0..10 {
//!                     ctx.check_cancelled()?;
//!                     ctx.report_progress((chunk + 1) as f32 / 10.0);
//!                 }
//!                 Ok(TaskOutput::at("renders/interview.mp4"))
//!             }),
//!     )
//!     .unwrap();
//!
//! let summary = scheduler.wait_for(id, Duration::from_secs(5)).unwrap();
//! assert_eq!(summary.status, TaskStatus::Completed);
//!
//! scheduler.shutdown();
//! ```

mod cancel;
mod config;
mod error;
mod priority;
mod scheduler;
mod task;
mod worker;

// Re-export public API
pub use cancel::{CancellationToken, Interrupt};
pub use config::{ConfigError, SchedulerConfig};
pub use error::{SchedulerError, SubmissionError, TaskError};
pub use scheduler::{CancelOutcome, SchedulerStats, TaskScheduler};
pub use task::{
    RenderTask, TaskContext, TaskEvent, TaskFilter, TaskId, TaskKind, TaskOutput, TaskPriority,
    TaskRoutine, TaskStatus, TaskSummary,
};
pub use worker::default_concurrency;
