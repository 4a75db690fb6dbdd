//! Background activity logger: structured events over a bounded channel into
//! an append-only JSONL file.
//!
//! The supervision loop must never block on logging, so `send` is a
//! `try_send`; events dropped under backpressure are counted and the count is
//! observable. Writer failures degrade to stderr rather than failing the
//! daemon.

#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

use crate::core::errors::{AgentError, Result};

/// Default bound for the event channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Structured activity events emitted by the daemon.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActivityEvent {
    AgentStarted {
        version: String,
        pid: u32,
        hostname: String,
    },
    CycleCompleted {
        cycle: u64,
        checks_run: usize,
        checks_failed: usize,
        metrics_collected: usize,
        duration_ms: u64,
    },
    CheckFailed {
        check: String,
        error: String,
    },
    EmitterFailed {
        emitter: String,
        error: String,
    },
    PayloadEmitted {
        emitter: String,
        host: String,
        metrics: usize,
    },
    Error {
        code: String,
        message: String,
    },
    AgentStopped {
        reason: String,
        uptime_secs: u64,
    },
}

#[derive(Debug)]
enum LogMsg {
    Event(ActivityEvent),
    Shutdown,
}

/// Configuration for the logger thread.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// JSONL destination.
    pub path: PathBuf,
    /// Channel bound; sends beyond it are dropped and counted.
    pub channel_capacity: usize,
    /// Echo every event to stderr as well.
    pub debug_echo: bool,
}

impl LoggerConfig {
    /// Logger config for the given destination with default capacity.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, debug_echo: bool) -> Self {
        Self {
            path: path.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            debug_echo,
        }
    }
}

/// Cloneable handle for submitting events to the logger thread.
#[derive(Debug, Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<LogMsg>,
    dropped: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Submit an event. Never blocks; a full channel drops the event and
    /// bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        match self.tx.try_send(LogMsg::Event(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events silently dropped due to channel backpressure.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ask the writer thread to drain and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LogMsg::Shutdown);
    }
}

/// Spawn the writer thread. Join the returned handle after
/// [`ActivityLoggerHandle::shutdown`] to guarantee the tail is flushed.
pub fn spawn_logger(config: LoggerConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<LogMsg>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    let join = thread::Builder::new()
        .name("tagent-logger".to_string())
        .spawn(move || writer_main(&rx, &config))
        .map_err(|source| AgentError::Runtime {
            details: format!("failed to spawn logger thread: {source}"),
        })?;

    Ok((ActivityLoggerHandle { tx, dropped }, join))
}

fn writer_main(rx: &Receiver<LogMsg>, config: &LoggerConfig) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMsg::Shutdown => return,
            LogMsg::Event(event) => {
                let line = Line {
                    ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    event: &event,
                };
                match serde_json::to_string(&line) {
                    Ok(json) => {
                        if config.debug_echo {
                            eprintln!("[TAGENT] {json}");
                        }
                        if let Err(err) = append_line(config, &json) {
                            eprintln!("[TAGENT-LOGGER] write failed: {err}; {json}");
                        }
                    }
                    Err(err) => eprintln!("[TAGENT-LOGGER] serialize failed: {err}"),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a ActivityEvent,
}

fn append_line(config: &LoggerConfig, json: &str) -> std::io::Result<()> {
    if let Some(parent) = config.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)?;
    writeln!(file, "{json}")?;
    file.flush()
}
