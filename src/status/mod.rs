//! Durable run-status record for out-of-band inspection.
//!
//! Written at startup and after every completed cycle, removed only on the
//! clean-shutdown path. A forced termination (watchdog kill, SIGKILL) leaves
//! the record behind on purpose: a timestamp older than the collection
//! interval plus slack tells external monitors the daemon is gone or wedged.
//!
//! Writes are atomic (write to `.tmp`, fsync, then `rename()`) so a reader
//! never observes a partial record.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{AgentError, Result};

/// Lifecycle states that are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Startup record, written before the first cycle begins.
    Starting,
    /// At least one cycle has completed; `timestamp` is the last completion.
    Running,
}

/// Snapshot of the daemon's last-known lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current run state.
    pub state: RunState,
    /// PID of the recording process.
    pub pid: u32,
    /// When this run started (RFC 3339).
    pub started_at: String,
    /// When this record was last written (RFC 3339).
    pub timestamp: String,
}

impl StatusRecord {
    /// Age of the record relative to now; `None` when the timestamp does not
    /// parse.
    #[must_use]
    pub fn age(&self) -> Option<chrono::Duration> {
        let written = DateTime::parse_from_rfc3339(&self.timestamp).ok()?;
        Some(Utc::now().signed_duration_since(written))
    }
}

/// Owner of the status record file.
#[derive(Debug, Clone)]
pub struct StatusRecorder {
    path: PathBuf,
    started_at: String,
}

impl StatusRecorder {
    /// Create a recorder for the given well-known location. The start
    /// timestamp is fixed at construction.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started_at: now_rfc3339(),
        }
    }

    /// Location of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state, overwriting any prior record.
    pub fn persist(&self, starting: bool) -> Result<()> {
        let record = StatusRecord {
            state: if starting {
                RunState::Starting
            } else {
                RunState::Running
            },
            pid: std::process::id(),
            started_at: self.started_at.clone(),
            timestamp: now_rfc3339(),
        };
        write_record_atomic(&self.path, &record)
    }

    /// Delete the record. Clean-shutdown path only; a missing record is fine.
    pub fn remove_latest(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AgentError::io(&self.path, source)),
        }
    }

    /// Read the last persisted record. Absence is `None`, corruption is an
    /// error.
    pub fn read_latest(&self) -> Result<Option<StatusRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(AgentError::io(&self.path, source)),
        };
        let record: StatusRecord = serde_json::from_str(&raw)?;
        Ok(Some(record))
    }

    /// Render the last record to stdout for the `check_status` command.
    /// An absent record reports "no status available" and is not a failure.
    pub fn print_latest(&self) -> Result<()> {
        match self.read_latest()? {
            None => println!("no status available"),
            Some(record) => print!("{}", render(&record)),
        }
        Ok(())
    }
}

/// Human-readable rendering of a status record.
#[must_use]
pub fn render(record: &StatusRecord) -> String {
    let state = match record.state {
        RunState::Starting => "starting",
        RunState::Running => "running",
    };
    let age = record
        .age()
        .map_or_else(String::new, |age| format!(" ({}s ago)", age.num_seconds()));
    format!(
        "state: {state}\npid: {pid}\nstarted: {started}\nlast update: {updated}{age}\n",
        pid = record.pid,
        started = record.started_at,
        updated = record.timestamp,
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write the record atomically: tmp file, fsync, rename. 0o644 on Unix so an
/// unprivileged operator can inspect a record written by a root daemon.
fn write_record_atomic(path: &Path, record: &StatusRecord) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AgentError::io(parent, source))?;
    }

    let json = serde_json::to_string_pretty(record)?;

    let result = (|| {
        {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts
                .open(&tmp_path)
                .map_err(|source| AgentError::io(&tmp_path, source))?;
            file.write_all(json.as_bytes())
                .map_err(|source| AgentError::io(&tmp_path, source))?;
            file.sync_all()
                .map_err(|source| AgentError::io(&tmp_path, source))?;
        }
        fs::rename(&tmp_path, path).map_err(|source| AgentError::io(path, source))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
