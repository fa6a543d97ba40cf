//! Pressure escalation against a fully wired engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use mediaflow_cache::{CacheConfig, Tier};
use mediaflow_engine::{
    DiskResponse, Engine, EngineConfig, PressureConfig, PressureLevel,
};
use mediaflow_scheduler::{
    RenderTask, SchedulerConfig, TaskFilter, TaskKind, TaskOutput, TaskPriority, TaskStatus,
};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

fn start_engine(pressure: PressureConfig) -> (Engine, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        cache: CacheConfig::default()
            .with_memory_limit(64 * 1024)
            .with_disk_limit(256 * 1024)
            .with_disk_dir(dir.path()),
        scheduler: SchedulerConfig::new(1),
        pressure,
    };
    (Engine::start(config).unwrap(), dir)
}

fn fill_cache(engine: &Engine) {
    let cache = engine.cache();
    for i in 0..8 {
        cache.set_memory(&format!("frame:{i}"), vec![i as u8; 4096], None).unwrap();
        cache.set_disk(&format!("proxy:{i}"), vec![i as u8; 8192]).unwrap();
    }
    let stats = cache.stats();
    assert_eq!(stats.memory_bytes_used, 8 * 4096);
    assert_eq!(stats.disk_bytes_used, 8 * 8192);
}

/// Occupies the single slot until released or cancelled
fn occupy_slot(engine: &Engine) -> Sender<()> {
    let (release, gate) = crossbeam_channel::unbounded::<()>();
    engine
        .scheduler()
        .submit(RenderTask::new(TaskKind::Export, "timeline.json").with_routine(move |ctx| loop {
            if gate.recv_timeout(Duration::from_millis(2)).is_ok() {
                return Ok(TaskOutput::none());
            }
            ctx.check_cancelled()?;
        }))
        .unwrap();
    release
}

fn submit_queued(engine: &Engine, priority: TaskPriority, count: usize) {
    for _ in 0..count {
        engine
            .scheduler()
            .submit(
                RenderTask::new(TaskKind::ThumbnailGeneration, "clip.mov")
                    .with_priority(priority)
                    .with_routine(|_| Ok(TaskOutput::none())),
            )
            .unwrap();
    }
}

fn queued_at_or_below(engine: &Engine, ceiling: TaskPriority) -> usize {
    engine
        .scheduler()
        .list_tasks(TaskFilter::all().with_status(TaskStatus::Queued))
        .iter()
        .filter(|task| task.priority <= ceiling)
        .count()
}

#[test]
fn test_critical_clears_both_tiers_and_trims_queue() {
    let (engine, _dir) = start_engine(PressureConfig::default().with_queued_task_cap(2));
    fill_cache(&engine);
    let release = occupy_slot(&engine);
    submit_queued(&engine, TaskPriority::Low, 5);
    submit_queued(&engine, TaskPriority::High, 1);

    let response = engine.monitor().handle(PressureLevel::Critical);
    assert!(response.escalated);
    assert_eq!(response.memory_bytes_released, 8 * 4096);
    assert_eq!(response.disk_bytes_released, 8 * 8192);
    assert_eq!(response.tasks_shed.len(), 3);

    let stats = engine.cache().stats();
    assert_eq!(stats.memory_bytes_used, 0);
    assert_eq!(stats.disk_bytes_used, 0);
    assert_eq!(queued_at_or_below(&engine, TaskPriority::Normal), 2);

    // Running and high-priority work is untouched
    let scheduler = engine.scheduler();
    assert_eq!(scheduler.stats().active, 1);
    assert_eq!(
        scheduler
            .list_tasks(TaskFilter::all().with_min_priority(TaskPriority::High))
            .first()
            .map(|task| task.status),
        Some(TaskStatus::Queued)
    );

    release.send(()).unwrap();
    assert!(scheduler.wait_idle(TIMEOUT));
    assert_eq!(scheduler.stats().completed, 4);
    engine.shutdown();
}

#[test]
fn test_warning_only_releases_memory() {
    let (engine, _dir) = start_engine(PressureConfig::default());
    fill_cache(&engine);
    let release = occupy_slot(&engine);
    submit_queued(&engine, TaskPriority::Low, 6);

    let response = engine.monitor().handle(PressureLevel::Warning);
    assert!(response.tasks_shed.is_empty());
    assert_eq!(response.disk_bytes_released, 0);

    let stats = engine.cache().stats();
    assert_eq!(stats.memory_bytes_used, 0);
    assert_eq!(stats.disk_bytes_used, 8 * 8192);
    assert_eq!(queued_at_or_below(&engine, TaskPriority::Low), 6);

    release.send(()).unwrap();
    engine.shutdown();
}

#[test]
fn test_urgent_sheds_all_low_priority_work() {
    let (engine, _dir) = start_engine(PressureConfig::default());
    let release = occupy_slot(&engine);
    submit_queued(&engine, TaskPriority::Low, 3);
    submit_queued(&engine, TaskPriority::Normal, 3);
    submit_queued(&engine, TaskPriority::Urgent, 2);

    engine.monitor().handle(PressureLevel::Critical);
    assert_eq!(queued_at_or_below(&engine, TaskPriority::Normal), 4);

    let response = engine.monitor().handle(PressureLevel::Urgent);
    assert_eq!(response.tasks_shed.len(), 4);
    assert_eq!(queued_at_or_below(&engine, TaskPriority::Normal), 0);
    assert_eq!(engine.scheduler().stats().queued, 2);
    assert_eq!(engine.monitor().stats().tasks_shed, 6);

    release.send(()).unwrap();
    engine.shutdown();
}

#[test]
fn test_shrink_disk_response() {
    let (engine, _dir) = start_engine(
        PressureConfig::default().with_disk_response(DiskResponse::Shrink {
            target_bytes: 3 * 8192,
        }),
    );
    fill_cache(&engine);

    let response = engine.monitor().handle(PressureLevel::Critical);
    assert_eq!(response.disk_bytes_released, 5 * 8192);

    let cache = engine.cache();
    assert_eq!(cache.stats().memory_bytes_used, 0);
    assert_eq!(cache.stats().disk_bytes_used, 3 * 8192);
    // LRU on disk keeps the most recently written entries
    assert!(cache.contains(Tier::Disk, "proxy:7"));
    assert!(!cache.contains(Tier::Disk, "proxy:0"));
    engine.shutdown();
}

#[test]
fn test_callbacks_run_after_cache_release() {
    let (engine, _dir) = start_engine(PressureConfig::default());
    fill_cache(&engine);

    let cache = engine.cache().clone();
    let observed = Arc::new(AtomicUsize::new(usize::MAX));
    let seen = observed.clone();
    engine.monitor().on_critical(move |_| {
        seen.store(cache.stats().disk_bytes_used, Ordering::SeqCst);
        Ok(())
    });
    engine
        .monitor()
        .on_warning(|level| anyhow::bail!("soft cleanup failed at {level}"));

    let response = engine.monitor().handle(PressureLevel::Critical);
    assert_eq!(response.callbacks_run, 2);
    assert_eq!(response.callback_failures, 1);
    assert_eq!(observed.load(Ordering::SeqCst), 0);
    engine.shutdown();
}

#[test]
fn test_platform_signal_stream() {
    let (engine, _dir) = start_engine(PressureConfig::default());
    fill_cache(&engine);

    let signals = engine.pressure_signals().unwrap();
    signals.send(PressureLevel::Warning).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while engine.cache().stats().memory_bytes_used > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.cache().stats().memory_bytes_used, 0);
    assert_eq!(engine.cache().stats().disk_bytes_used, 8 * 8192);
    assert_eq!(engine.monitor().level(), PressureLevel::Warning);

    engine.shutdown();
}
