//! In-process supervision-loop lifecycle tests.
//!
//! The loop is driven in foreground-equivalent mode with stub checks and
//! emitters and a manually flipped shutdown flag — no forking, no signals.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use telemetry_agent::collector::{CheckModule, Emitter, MetricPayload};
use telemetry_agent::core::config::CycleConfig;
use telemetry_agent::core::errors::{AgentError, Result};
use telemetry_agent::daemon::loop_main::CollectorLoop;
use telemetry_agent::daemon::signals::ShutdownFlag;
use telemetry_agent::logger::{ActivityLoggerHandle, LoggerConfig, spawn_logger};
use telemetry_agent::status::{RunState, StatusRecorder};

struct TickCheck {
    calls: Arc<AtomicUsize>,
}

impl CheckModule for TickCheck {
    fn name(&self) -> &str {
        "tick"
    }

    fn collect(&mut self) -> Result<BTreeMap<String, f64>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        #[allow(clippy::cast_precision_loss)]
        let value = n as f64;
        Ok(BTreeMap::from([("tick.count".to_string(), value)]))
    }
}

struct BrokenCheck;

impl CheckModule for BrokenCheck {
    fn name(&self) -> &str {
        "broken"
    }

    fn collect(&mut self) -> Result<BTreeMap<String, f64>> {
        Err(AgentError::Runtime {
            details: "injected failure".to_string(),
        })
    }
}

struct CountingEmitter {
    emitted: Arc<AtomicUsize>,
}

impl Emitter for CountingEmitter {
    fn name(&self) -> &str {
        "counting"
    }

    fn emit(&mut self, _payload: &MetricPayload) -> Result<()> {
        self.emitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_logger(dir: &Path) -> ActivityLoggerHandle {
    let (logger, _join) =
        spawn_logger(LoggerConfig::new(dir.join("activity.jsonl"), false)).unwrap();
    logger
}

struct Fixture {
    shutdown: ShutdownFlag,
    calls: Arc<AtomicUsize>,
    emitted: Arc<AtomicUsize>,
    lp: CollectorLoop,
}

fn fixture(dir: &Path, interval: Duration, watchdog: bool, with_broken: bool) -> Fixture {
    let shutdown = ShutdownFlag::manual();
    let calls = Arc::new(AtomicUsize::new(0));
    let emitted = Arc::new(AtomicUsize::new(0));

    let mut checks: Vec<Box<dyn CheckModule>> = Vec::new();
    if with_broken {
        checks.push(Box::new(BrokenCheck));
    }
    checks.push(Box::new(TickCheck {
        calls: Arc::clone(&calls),
    }));
    let emitters: Vec<Box<dyn Emitter>> = vec![Box::new(CountingEmitter {
        emitted: Arc::clone(&emitted),
    })];

    let lp = CollectorLoop::new(
        CycleConfig { interval, watchdog },
        StatusRecorder::new(dir.join("status.json")),
        shutdown.clone(),
        test_logger(dir),
        "integration-host".to_string(),
        checks,
        emitters,
    );

    Fixture {
        shutdown,
        calls,
        emitted,
        lp,
    }
}

fn wait_for(condition: impl Fn() -> bool, timeout: Duration, what: &str) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < timeout, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn full_lifecycle_start_run_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status.json");
    let start_wall = chrono::Utc::now();

    let Fixture {
        shutdown,
        calls,
        emitted,
        mut lp,
    } = fixture(dir.path(), Duration::from_millis(25), true, false);

    let handle = thread::spawn(move || {
        lp.run().unwrap();
        lp.cycles_completed()
    });

    wait_for(
        || calls.load(Ordering::SeqCst) >= 2,
        Duration::from_secs(5),
        "two cycles",
    );

    // After at least one completed cycle the record is "running" with a
    // timestamp between start and now.
    let recorder = StatusRecorder::new(status_path.clone());
    let record = recorder.read_latest().unwrap().expect("record present");
    assert_eq!(record.state, RunState::Running);
    let written = chrono::DateTime::parse_from_rfc3339(&record.timestamp).unwrap();
    assert!(written.timestamp_millis() >= start_wall.timestamp_millis() - 1);
    assert!(written.timestamp_millis() <= chrono::Utc::now().timestamp_millis() + 1);

    shutdown.request_shutdown();
    let cycles = handle.join().unwrap();

    // Clean shutdown: record gone, emissions matched cycles.
    assert!(!status_path.exists());
    assert_eq!(u64::try_from(emitted.load(Ordering::SeqCst)).unwrap(), cycles);
}

#[test]
fn shutdown_mid_sleep_skips_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let interval = Duration::from_millis(400);

    let Fixture {
        shutdown,
        calls,
        mut lp,
        ..
    } = fixture(dir.path(), interval, false, false);

    let handle = thread::spawn(move || {
        lp.run().unwrap();
        lp.cycles_completed()
    });

    wait_for(
        || calls.load(Ordering::SeqCst) == 1,
        Duration::from_secs(5),
        "first cycle",
    );
    // The loop is now sleeping. Request shutdown and measure the latency:
    // it must wake, observe the flag, and exit without another cycle.
    let requested_at = Instant::now();
    shutdown.request_shutdown();
    let cycles = handle.join().unwrap();

    assert_eq!(cycles, 1, "no cycle may start after shutdown was requested");
    assert!(
        requested_at.elapsed() <= interval + Duration::from_millis(250),
        "shutdown latency must be bounded by the remaining sleep"
    );
}

#[test]
fn broken_module_does_not_stop_cycles_or_emission() {
    let dir = tempfile::tempdir().unwrap();

    let Fixture {
        shutdown,
        calls,
        emitted,
        mut lp,
    } = fixture(dir.path(), Duration::from_millis(20), true, true);

    let handle = thread::spawn(move || {
        lp.run().unwrap();
        lp.cycles_completed()
    });

    wait_for(
        || calls.load(Ordering::SeqCst) >= 3,
        Duration::from_secs(5),
        "three cycles despite the broken module",
    );
    shutdown.request_shutdown();
    let cycles = handle.join().unwrap();

    assert!(cycles >= 3);
    assert!(emitted.load(Ordering::SeqCst) >= 3, "payloads still emitted");
    // The run ended cleanly: no status record left behind.
    assert!(!dir.path().join("status.json").exists());
}

#[test]
fn zero_cycles_when_shutdown_precedes_run() {
    let dir = tempfile::tempdir().unwrap();

    let Fixture {
        shutdown,
        calls,
        mut lp,
        ..
    } = fixture(dir.path(), Duration::from_millis(20), false, false);

    shutdown.request_shutdown();
    lp.run().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("status.json").exists());
}

#[test]
fn activity_log_records_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("activity.jsonl");

    let shutdown = ShutdownFlag::manual();
    let calls = Arc::new(AtomicUsize::new(0));
    let (logger, logger_join) = spawn_logger(LoggerConfig::new(log_path.clone(), false)).unwrap();

    let checks: Vec<Box<dyn CheckModule>> = vec![Box::new(TickCheck {
        calls: Arc::clone(&calls),
    })];
    let mut lp = CollectorLoop::new(
        CycleConfig {
            interval: Duration::from_millis(20),
            watchdog: false,
        },
        StatusRecorder::new(dir.path().join("status.json")),
        shutdown.clone(),
        logger.clone(),
        "integration-host".to_string(),
        checks,
        Vec::new(),
    );

    let handle = thread::spawn(move || lp.run().unwrap());
    wait_for(
        || calls.load(Ordering::SeqCst) >= 1,
        Duration::from_secs(5),
        "first cycle",
    );
    shutdown.request_shutdown();
    handle.join().unwrap();
    logger.shutdown();
    logger_join.join().unwrap();

    let raw = std::fs::read_to_string(&log_path).unwrap();
    assert!(raw.contains("agent_started"));
    assert!(raw.contains("cycle_completed"));
    assert!(raw.contains("agent_stopped"));
}
