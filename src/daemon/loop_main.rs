//! The supervision loop: one collection cycle per interval, watchdog feeding,
//! durable status updates, cooperative shutdown.
//!
//! Single logical thread of control. The only concurrency on top of it is the
//! SIGTERM flag (polled at the two loop boundaries, never mid-cycle) and the
//! watchdog tick thread, which shares nothing with the loop but the deadline.
//! Cycles are strictly sequential: cycle N+1 never starts before cycle N's
//! collector invocation returns.

use std::thread;
use std::time::Instant;

use crate::collector::checks::load_check_modules;
use crate::collector::emitter::{EmitterContext, EmitterRegistry, load_emitters};
use crate::collector::identity::{NoCloud, resolve_hostname};
use crate::collector::{CheckModule, Collector, Emitter};
use crate::core::config::{AgentConfig, CycleConfig};
use crate::core::errors::Result;
use crate::daemon::signals::ShutdownFlag;
use crate::daemon::watchdog::Watchdog;
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::status::StatusRecorder;

/// The supervision loop: drives the collector until shutdown is observed.
pub struct CollectorLoop {
    cycle: CycleConfig,
    status: StatusRecorder,
    shutdown: ShutdownFlag,
    logger: ActivityLoggerHandle,
    collector: Collector,
    checks: Vec<Box<dyn CheckModule>>,
    emitters: Vec<Box<dyn Emitter>>,
    host: String,
    cycles_completed: u64,
}

impl CollectorLoop {
    /// Assemble a loop from already-built parts. Tests drive this directly
    /// with stub checks and emitters; production code uses
    /// [`Self::from_config`].
    #[must_use]
    pub fn new(
        cycle: CycleConfig,
        status: StatusRecorder,
        shutdown: ShutdownFlag,
        logger: ActivityLoggerHandle,
        host: String,
        checks: Vec<Box<dyn CheckModule>>,
        emitters: Vec<Box<dyn Emitter>>,
    ) -> Self {
        let collector = Collector::new(host.clone(), logger.clone());
        Self {
            cycle,
            status,
            shutdown,
            logger,
            collector,
            checks,
            emitters,
            host,
            cycles_completed: 0,
        }
    }

    /// Resolve everything the loop needs from configuration: host identity,
    /// the check-module set, and the emitter set. Registry lookups happen
    /// here, once per run — a bad identifier fails before the loop starts.
    pub fn from_config(
        config: &AgentConfig,
        shutdown: ShutdownFlag,
        logger: ActivityLoggerHandle,
    ) -> Result<Self> {
        let host = resolve_hostname(config, &NoCloud);
        let checks = load_check_modules(config)?;
        let ctx = EmitterContext {
            spool_path: config.paths.metrics_spool.clone(),
            logger: logger.clone(),
        };
        let emitters = load_emitters(config, &EmitterRegistry::default(), &ctx)?;
        let status = StatusRecorder::new(config.paths.status_file.clone());

        Ok(Self::new(
            config.cycle(),
            status,
            shutdown,
            logger,
            host,
            checks,
            emitters,
        ))
    }

    /// Cycles completed so far in this run.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Run until shutdown is requested.
    ///
    /// An error escaping the collector's cycle invocation is not caught —
    /// it propagates, the status record stays behind, and the process exits
    /// non-zero. Restart-on-crash belongs to an external process supervisor.
    pub fn run(&mut self) -> Result<()> {
        let started = Instant::now();

        self.persist_status(true);
        self.logger.send(ActivityEvent::AgentStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            hostname: self.host.clone(),
        });

        let watchdog = self
            .cycle
            .watchdog
            .then(|| Watchdog::arm(self.cycle.watchdog_timeout()));
        if let Some(watchdog) = &watchdog {
            watchdog.reset();
        }

        while !self.shutdown.should_shutdown() {
            let summary = self
                .collector
                .run_cycle(&mut self.checks, &mut self.emitters)?;
            self.cycles_completed += 1;

            // Reset only after the cycle returned: a wedge inside the
            // collector must let the deadline lapse.
            if let Some(watchdog) = &watchdog {
                watchdog.reset();
            }
            self.persist_status(false);
            self.logger.send(ActivityEvent::CycleCompleted {
                cycle: self.cycles_completed,
                checks_run: summary.checks_run,
                checks_failed: summary.checks_failed,
                metrics_collected: summary.metrics_collected,
                duration_ms: summary.duration_ms,
            });

            // Only sleep if we'll continue.
            if !self.shutdown.should_shutdown() {
                thread::sleep(self.cycle.interval);
            }
        }

        if let Some(watchdog) = &watchdog {
            watchdog.disarm();
        }
        if let Err(err) = self.status.remove_latest() {
            self.logger.send(ActivityEvent::Error {
                code: err.code().to_string(),
                message: format!("removing status record failed: {err}"),
            });
        }
        self.logger.send(ActivityEvent::AgentStopped {
            reason: "shutdown requested".to_string(),
            uptime_secs: started.elapsed().as_secs(),
        });
        Ok(())
    }

    /// Status persistence is best-effort inside the run: a failed write is
    /// logged, never fatal to the loop.
    fn persist_status(&self, starting: bool) {
        if let Err(err) = self.status.persist(starting) {
            self.logger.send(ActivityEvent::Error {
                code: err.code().to_string(),
                message: format!("persisting status record failed: {err}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CollectorLoop;
    use crate::collector::test_support::{CountingCheck, FailingCheck};
    use crate::collector::{CheckModule, Emitter};
    use crate::core::config::{AgentConfig, CycleConfig, PathsConfig};
    use crate::daemon::signals::ShutdownFlag;
    use crate::logger::{ActivityLoggerHandle, LoggerConfig, spawn_logger};
    use crate::status::{RunState, StatusRecorder};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn test_logger(dir: &std::path::Path) -> ActivityLoggerHandle {
        let (logger, _join) =
            spawn_logger(LoggerConfig::new(dir.join("activity.jsonl"), false)).unwrap();
        logger
    }

    fn short_cycle(watchdog: bool) -> CycleConfig {
        CycleConfig {
            interval: Duration::from_millis(30),
            watchdog,
        }
    }

    fn counting_loop(
        dir: &std::path::Path,
        watchdog: bool,
        checks: Vec<Box<dyn CheckModule>>,
    ) -> (CollectorLoop, ShutdownFlag) {
        let shutdown = ShutdownFlag::manual();
        let emitters: Vec<Box<dyn Emitter>> = Vec::new();
        let lp = CollectorLoop::new(
            short_cycle(watchdog),
            StatusRecorder::new(dir.join("status.json")),
            shutdown.clone(),
            test_logger(dir),
            "test-host".to_string(),
            checks,
            emitters,
        );
        (lp, shutdown)
    }

    #[test]
    fn completes_cycles_then_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let checks: Vec<Box<dyn CheckModule>> = vec![Box::new(CountingCheck {
            name: "counter".to_string(),
            calls: Arc::clone(&calls),
        })];
        let (mut lp, shutdown) = counting_loop(dir.path(), true, checks);
        let status_path = dir.path().join("status.json");

        let handle = thread::spawn(move || {
            lp.run().unwrap();
            lp.cycles_completed()
        });

        // Wait for at least two cycles.
        while calls.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(status_path.exists());

        shutdown.request_shutdown();
        let cycles = handle.join().unwrap();
        assert!(cycles >= 2);
        // Clean shutdown removes the record.
        assert!(!status_path.exists());
    }

    #[test]
    fn status_record_progresses_to_running_with_bounded_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let before = chrono::Utc::now();
        let calls = Arc::new(AtomicUsize::new(0));
        let checks: Vec<Box<dyn CheckModule>> = vec![Box::new(CountingCheck {
            name: "counter".to_string(),
            calls: Arc::clone(&calls),
        })];
        let (mut lp, shutdown) = counting_loop(dir.path(), false, checks);
        let recorder = StatusRecorder::new(dir.path().join("status.json"));

        let handle = thread::spawn(move || lp.run().unwrap());
        while calls.load(Ordering::SeqCst) < 1 {
            thread::sleep(Duration::from_millis(5));
        }

        let record = recorder.read_latest().unwrap().expect("record must exist");
        assert_eq!(record.state, RunState::Running);
        let written = chrono::DateTime::parse_from_rfc3339(&record.timestamp).unwrap();
        assert!(written.timestamp_millis() >= before.timestamp_millis() - 1);
        assert!(written.timestamp_millis() <= chrono::Utc::now().timestamp_millis() + 1);

        shutdown.request_shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn failing_module_never_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let checks: Vec<Box<dyn CheckModule>> = vec![
            Box::new(FailingCheck),
            Box::new(CountingCheck {
                name: "survivor".to_string(),
                calls: Arc::clone(&calls),
            }),
        ];
        let (mut lp, shutdown) = counting_loop(dir.path(), true, checks);

        let handle = thread::spawn(move || {
            lp.run().unwrap();
            lp.cycles_completed()
        });
        while calls.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.request_shutdown();
        // The loop kept cycling (and kept re-arming its watchdog) despite the
        // permanently failing module.
        assert!(handle.join().unwrap() >= 3);
    }

    #[test]
    fn shutdown_requested_before_start_runs_zero_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let checks: Vec<Box<dyn CheckModule>> = vec![Box::new(CountingCheck {
            name: "counter".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        })];
        let (mut lp, shutdown) = counting_loop(dir.path(), false, checks);
        shutdown.request_shutdown();

        lp.run().unwrap();
        assert_eq!(lp.cycles_completed(), 0);
        // Even a zero-cycle run cleans up its startup record.
        assert!(!dir.path().join("status.json").exists());
    }

    #[test]
    fn from_config_resolves_builtin_sets() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            paths: PathsConfig {
                pid_file: dir.path().join("agent.pid"),
                status_file: dir.path().join("status.json"),
                activity_log: dir.path().join("activity.jsonl"),
                metrics_spool: dir.path().join("spool.jsonl"),
            },
            ..AgentConfig::default()
        };

        let lp = CollectorLoop::from_config(
            &config,
            ShutdownFlag::manual(),
            test_logger(dir.path()),
        )
        .unwrap();
        assert_eq!(lp.cycles_completed(), 0);
        assert_eq!(lp.checks.len(), 3);
        assert_eq!(lp.emitters.len(), 1);
    }

    #[test]
    fn unknown_emitter_fails_before_the_loop_starts() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            custom_emitters: "statsd".to_string(),
            paths: PathsConfig {
                pid_file: dir.path().join("agent.pid"),
                status_file: dir.path().join("status.json"),
                activity_log: dir.path().join("activity.jsonl"),
                metrics_spool: dir.path().join("spool.jsonl"),
            },
            ..AgentConfig::default()
        };

        let err = CollectorLoop::from_config(
            &config,
            ShutdownFlag::manual(),
            test_logger(dir.path()),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "TA-2101");
        // No startup record was written.
        assert!(!dir.path().join("status.json").exists());
    }
}
