//! Lifecycle controller: start, stop, restart, foreground, status.
//!
//! `start` daemonizes; `foreground` is the same run without detaching — the
//! path the test suite and interactive debugging drive. Everything else is
//! PID-file bookkeeping and signal delivery to a previously started agent.

use std::process;
use std::thread;
use std::time::Duration;

use crate::core::config::AgentConfig;
use crate::core::errors::{AgentError, Result};
use crate::daemon::loop_main::CollectorLoop;
use crate::daemon::pidfile::{PidFile, process_alive};
use crate::daemon::service;
use crate::daemon::signals::ShutdownFlag;
use crate::logger::{ActivityEvent, LoggerConfig, spawn_logger};

/// Poll interval while waiting for a stopped daemon to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Grace added to the collection interval when bounding the stop wait. The
/// loop observes SIGTERM only at its boundaries, so a daemon caught mid-sleep
/// needs up to a full interval to exit.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Outcome of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live instance was found; informational, not an error.
    NotRunning,
    /// The instance exited after SIGTERM.
    Stopped { pid: u32 },
}

/// Liveness answer for the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    /// A live instance holds the singleton.
    Running { pid: u32 },
    /// No handle, or the handle points at a dead process.
    NotRunning,
}

/// The daemon controller.
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    pid_file: PidFile,
}

impl Agent {
    /// Controller for the given configuration.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let pid_file = PidFile::new(config.paths.pid_file.clone());
        Self { config, pid_file }
    }

    /// The singleton handle this controller manages.
    #[must_use]
    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Start the daemon: singleton check, detach, register the backgrounded
    /// PID, run the loop.
    ///
    /// The singleton check comes first so a second `start` has no side
    /// effects at all — no handle write, no status write.
    pub fn start(&self) -> Result<()> {
        if let Some(pid) = self.pid_file.live_pid() {
            return Err(AgentError::AlreadyRunning { pid });
        }
        service::daemonize()?;
        // We are the backgrounded process now; record its PID.
        self.pid_file.write(process::id())?;
        self.run_loop()
    }

    /// Run the loop without detaching. Identical to `start` in all other
    /// respects, including the singleton registration.
    pub fn foreground(&self) -> Result<()> {
        self.pid_file.register()?;
        self.run_loop()
    }

    fn run_loop(&self) -> Result<()> {
        let (logger, logger_join) = spawn_logger(LoggerConfig::new(
            self.config.paths.activity_log.clone(),
            self.config.debug_mode,
        ))?;
        let shutdown = ShutdownFlag::for_termination()?;

        let result = CollectorLoop::from_config(&self.config, shutdown, logger.clone())
            .and_then(|mut lp| lp.run());

        if let Err(err) = &result {
            logger.send(ActivityEvent::Error {
                code: err.code().to_string(),
                message: format!("supervision loop failed: {err}"),
            });
        }
        if let Err(err) = self.pid_file.clean() {
            logger.send(ActivityEvent::Error {
                code: err.code().to_string(),
                message: format!("removing pid file failed: {err}"),
            });
        }
        logger.shutdown();
        let _ = logger_join.join();
        result
    }

    /// Stop a running daemon: SIGTERM, then a bounded wait for exit.
    pub fn stop(&self) -> Result<StopOutcome> {
        let Some(pid) = self.pid_file.read() else {
            return Ok(StopOutcome::NotRunning);
        };
        if !process_alive(pid) {
            // Stale handle from a crashed run.
            self.pid_file.clean()?;
            return Ok(StopOutcome::NotRunning);
        }

        send_sigterm(pid)?;

        let deadline = self.config.cycle().interval + STOP_GRACE;
        let mut waited = Duration::ZERO;
        while waited < deadline {
            thread::sleep(STOP_POLL_INTERVAL);
            waited += STOP_POLL_INTERVAL;
            if !process_alive(pid) {
                // The daemon removes its own handle on clean exit; make sure
                // it is gone either way.
                self.pid_file.clean()?;
                return Ok(StopOutcome::Stopped { pid });
            }
        }

        Err(AgentError::Signal {
            pid,
            details: format!("did not exit within {}s after SIGTERM", deadline.as_secs()),
        })
    }

    /// Stop (failures logged, never blocking) followed by start.
    pub fn restart(&self) -> Result<()> {
        if let Err(err) = self.stop() {
            eprintln!("[TAGENT] stop before restart failed: {err}");
        }
        self.start()
    }

    /// Liveness of the recorded instance.
    #[must_use]
    pub fn status(&self) -> RunningStatus {
        self.pid_file
            .live_pid()
            .map_or(RunningStatus::NotRunning, |pid| RunningStatus::Running {
                pid,
            })
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| AgentError::Signal {
        pid,
        details: "pid out of range".to_string(),
    })?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| AgentError::Signal {
        pid,
        details: format!("SIGTERM delivery failed: {errno}"),
    })
}

#[cfg(not(unix))]
fn send_sigterm(pid: u32) -> Result<()> {
    Err(AgentError::Signal {
        pid,
        details: "signal delivery is unsupported on this platform".to_string(),
    })
}
