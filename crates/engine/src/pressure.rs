//! Memory pressure response
//!
//! The host delivers discrete pressure levels (from a platform notification
//! or from [`PressureLevel::from_utilization`]). Each escalation runs a
//! cleanup cascade: Warning releases the memory tier and notifies soft
//! subscribers; Critical and Urgent also shrink or clear the disk tier, shed
//! queued low-priority tasks, and notify hard subscribers. Lower or equal
//! levels only record the new level.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use mediaflow_cache::{Tier, TieredCache};
use mediaflow_scheduler::{TaskId, TaskPriority, TaskScheduler};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Coarse classification of memory scarcity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Urgent,
}

impl PressureLevel {
    /// Classify a memory utilization ratio (used / available)
    ///
    /// # Example
    ///
    /// ```
    /// use mediaflow_engine::{PressureLevel, PressureThresholds};
    ///
    /// let thresholds = PressureThresholds::default();
    /// assert_eq!(PressureLevel::from_utilization(0.5, &thresholds), PressureLevel::Normal);
    /// assert_eq!(PressureLevel::from_utilization(0.9, &thresholds), PressureLevel::Critical);
    /// ```
    pub fn from_utilization(ratio: f64, thresholds: &PressureThresholds) -> Self {
        if ratio.is_nan() {
            PressureLevel::Normal
        } else if ratio >= thresholds.urgent {
            PressureLevel::Urgent
        } else if ratio >= thresholds.critical {
            PressureLevel::Critical
        } else if ratio >= thresholds.warning {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
            PressureLevel::Urgent => "urgent",
        };
        f.write_str(name)
    }
}

/// Utilization ratios at which each level starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureThresholds {
    pub warning: f64,
    pub critical: f64,
    pub urgent: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning: 0.75,
            critical: 0.85,
            urgent: 0.95,
        }
    }
}

impl PressureThresholds {
    /// Thresholds must be ascending and within (0, 1]
    pub fn is_valid(&self) -> bool {
        0.0 < self.warning
            && self.warning <= self.critical
            && self.critical <= self.urgent
            && self.urgent <= 1.0
    }
}

/// What Critical and Urgent do to the disk tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DiskResponse {
    /// Remove every disk entry
    #[default]
    Clear,
    /// Evict down to `target_bytes`
    Shrink { target_bytes: usize },
}

/// Pressure response configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Queued tasks at or below `shed_priority_ceiling` kept on Critical
    pub queued_task_cap: usize,
    /// Same cap applied on Urgent
    pub urgent_queued_task_cap: usize,
    /// Highest priority that may be shed
    pub shed_priority_ceiling: TaskPriority,
    pub disk_response: DiskResponse,
    pub thresholds: PressureThresholds,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            queued_task_cap: 4,
            urgent_queued_task_cap: 0,
            shed_priority_ceiling: TaskPriority::Normal,
            disk_response: DiskResponse::Clear,
            thresholds: PressureThresholds::default(),
        }
    }
}

impl PressureConfig {
    /// Sets how many sheddable tasks survive a Critical event
    pub fn with_queued_task_cap(mut self, cap: usize) -> Self {
        self.queued_task_cap = cap;
        self
    }

    /// Sets how many sheddable tasks survive an Urgent event
    pub fn with_urgent_queued_task_cap(mut self, cap: usize) -> Self {
        self.urgent_queued_task_cap = cap;
        self
    }

    /// Sets the highest priority that may be shed
    pub fn with_shed_priority_ceiling(mut self, ceiling: TaskPriority) -> Self {
        self.shed_priority_ceiling = ceiling;
        self
    }

    /// Sets the disk tier response on Critical and Urgent
    pub fn with_disk_response(mut self, response: DiskResponse) -> Self {
        self.disk_response = response;
        self
    }

    fn queue_cap(&self, level: PressureLevel) -> Option<usize> {
        match level {
            PressureLevel::Critical => Some(self.queued_task_cap),
            PressureLevel::Urgent => Some(self.urgent_queued_task_cap),
            _ => None,
        }
    }
}

/// Cleanup hook; an error is logged and counted, never propagated
pub type CleanupCallback = Arc<dyn Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `on_warning` / `on_critical`
pub type SubscriptionId = u64;

/// Monitor counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PressureStats {
    pub level: PressureLevel,
    pub escalations: u64,
    pub callback_failures: u64,
    pub tasks_shed: u64,
    pub last_escalation: Option<SystemTime>,
}

/// What one `handle` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressureResponse {
    pub previous: PressureLevel,
    pub level: PressureLevel,
    /// False when the level did not rise; nothing else was done
    pub escalated: bool,
    pub memory_bytes_released: usize,
    pub disk_bytes_released: usize,
    pub tasks_shed: Vec<TaskId>,
    pub callbacks_run: usize,
    pub callback_failures: usize,
}

#[derive(Default)]
struct Subscribers {
    soft: Vec<(SubscriptionId, CleanupCallback)>,
    hard: Vec<(SubscriptionId, CleanupCallback)>,
}

struct Listener {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Escalating memory-pressure handler
///
/// Owns shared handles to the collaborators it cleans up; constructed once by
/// the engine and shared behind an `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use mediaflow_engine::{MemoryPressureMonitor, PressureConfig, PressureLevel};
///
/// let monitor = MemoryPressureMonitor::new(PressureConfig::default());
/// let released = Arc::new(AtomicBool::new(false));
/// let flag = released.clone();
/// monitor.on_critical(move |_level| {
///     flag.store(true, Ordering::SeqCst);
///     Ok(())
/// });
///
/// monitor.handle(PressureLevel::Warning);
/// assert!(!released.load(Ordering::SeqCst));
///
/// monitor.handle(PressureLevel::Critical);
/// assert!(released.load(Ordering::SeqCst));
/// ```
pub struct MemoryPressureMonitor {
    config: PressureConfig,
    cache: Option<Arc<TieredCache>>,
    scheduler: Option<TaskScheduler>,
    stats: Mutex<PressureStats>,
    subscribers: Mutex<Subscribers>,
    next_subscription: AtomicU64,
    listener: Mutex<Option<Listener>>,
}

impl MemoryPressureMonitor {
    /// Create a monitor with no collaborators attached
    pub fn new(config: PressureConfig) -> Self {
        Self {
            config,
            cache: None,
            scheduler: None,
            stats: Mutex::new(PressureStats::default()),
            subscribers: Mutex::new(Subscribers::default()),
            next_subscription: AtomicU64::new(1),
            listener: Mutex::new(None),
        }
    }

    /// Cache whose tiers are released under pressure
    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Scheduler whose queue is trimmed on Critical and Urgent
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Register a soft-cleanup callback, run on every escalation
    pub fn on_warning<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().soft.push((id, Arc::new(callback)));
        id
    }

    /// Register a hard-cleanup callback, run on escalation to Critical or Urgent
    pub fn on_critical<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().hard.push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.soft.len() + subscribers.hard.len();
        subscribers.soft.retain(|(sub, _)| *sub != id);
        subscribers.hard.retain(|(sub, _)| *sub != id);
        before != subscribers.soft.len() + subscribers.hard.len()
    }

    /// Most recent pressure level
    pub fn level(&self) -> PressureLevel {
        self.stats.lock().level
    }

    /// Escalation counters
    pub fn stats(&self) -> PressureStats {
        self.stats.lock().clone()
    }

    /// Feed a utilization ratio through the configured thresholds
    pub fn handle_utilization(&self, ratio: f64) -> PressureResponse {
        self.handle(PressureLevel::from_utilization(ratio, &self.config.thresholds))
    }

    /// Apply a pressure signal.
    ///
    /// Runs the cleanup cascade only when `level` is above the current level.
    /// Callbacks run on the calling thread and must not call back into
    /// `handle`.
    pub fn handle(&self, level: PressureLevel) -> PressureResponse {
        let previous = {
            let mut stats = self.stats.lock();
            let previous = stats.level;
            stats.level = level;
            if level > previous {
                stats.escalations += 1;
                stats.last_escalation = Some(SystemTime::now());
            }
            previous
        };

        let mut response = PressureResponse {
            previous,
            level,
            ..PressureResponse::default()
        };
        if level <= previous {
            if level < previous {
                info!(from = %previous, to = %level, "memory pressure eased");
            }
            return response;
        }

        response.escalated = true;
        info!(from = %previous, to = %level, "memory pressure escalated");

        if let Some(cache) = &self.cache {
            response.memory_bytes_released = cache.clear_memory();
        }

        if level >= PressureLevel::Critical {
            self.release_disk(&mut response);
            self.shed_tasks(level, &mut response);
        }

        let (soft, hard) = {
            let subscribers = self.subscribers.lock();
            (subscribers.soft.clone(), subscribers.hard.clone())
        };
        self.run_callbacks("soft", &soft, level, &mut response);
        if level >= PressureLevel::Critical {
            self.run_callbacks("hard", &hard, level, &mut response);
        }

        if response.callback_failures > 0 || !response.tasks_shed.is_empty() {
            let mut stats = self.stats.lock();
            stats.callback_failures += response.callback_failures as u64;
            stats.tasks_shed += response.tasks_shed.len() as u64;
        }
        debug!(
            memory_bytes = response.memory_bytes_released,
            disk_bytes = response.disk_bytes_released,
            tasks_shed = response.tasks_shed.len(),
            callbacks = response.callbacks_run,
            "pressure response complete"
        );
        response
    }

    fn release_disk(&self, response: &mut PressureResponse) {
        let Some(cache) = &self.cache else {
            return;
        };
        response.disk_bytes_released = match self.config.disk_response {
            DiskResponse::Clear => cache.clear_disk(),
            DiskResponse::Shrink { target_bytes } => {
                let before = cache.tier_stats(Tier::Disk).bytes_used;
                cache.shrink_disk_to(target_bytes);
                before.saturating_sub(cache.tier_stats(Tier::Disk).bytes_used)
            }
        };
    }

    fn shed_tasks(&self, level: PressureLevel, response: &mut PressureResponse) {
        let (Some(scheduler), Some(cap)) = (&self.scheduler, self.config.queue_cap(level)) else {
            return;
        };
        response.tasks_shed = scheduler.trim_queue(cap, self.config.shed_priority_ceiling);
    }

    fn run_callbacks(
        &self,
        group: &'static str,
        callbacks: &[(SubscriptionId, CleanupCallback)],
        level: PressureLevel,
        response: &mut PressureResponse,
    ) {
        for (id, callback) in callbacks {
            response.callbacks_run += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(level))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    response.callback_failures += 1;
                    warn!(group, subscription = id, error = %err, "pressure callback failed");
                }
                Err(_) => {
                    response.callback_failures += 1;
                    warn!(group, subscription = id, "pressure callback panicked");
                }
            }
        }
    }

    /// Consume a platform signal stream on a background thread.
    ///
    /// Replaces any previously attached stream. The thread exits when the
    /// stream disconnects, on [`Self::detach`], or when the monitor is dropped.
    pub fn attach(self: &Arc<Self>, signals: Receiver<PressureLevel>) -> std::io::Result<()> {
        self.detach();

        let (stop_tx, stop_rx) = unbounded::<()>();
        let monitor: Weak<Self> = Arc::downgrade(self);
        let thread = thread::Builder::new()
            .name("mediaflow-pressure".to_string())
            .spawn(move || loop {
                select! {
                    recv(signals) -> signal => {
                        let Ok(level) = signal else { break };
                        let Some(monitor) = monitor.upgrade() else { break };
                        monitor.handle(level);
                    }
                    recv(stop_rx) -> _ => break,
                }
            })?;

        *self.listener.lock() = Some(Listener {
            stop: stop_tx,
            thread,
        });
        debug!("pressure signal stream attached");
        Ok(())
    }

    /// Attach a fresh channel and return its sending side
    pub fn signal_sender(self: &Arc<Self>) -> std::io::Result<Sender<PressureLevel>> {
        let (sender, receiver) = unbounded();
        self.attach(receiver)?;
        Ok(sender)
    }

    /// Stop the listener thread, if any, and wait for it
    pub fn detach(&self) {
        let listener = self.listener.lock().take();
        if let Some(Listener { stop, thread }) = listener {
            let _ = stop.send(());
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                warn!("pressure listener panicked");
            }
        }
    }
}
