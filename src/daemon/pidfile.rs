//! Single-instance PID file: register, query, liveness, force-clean.
//!
//! No concurrency control beyond filesystem atomicity — exactly one
//! supervisor process per machine is expected to call [`PidFile::register`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use crate::core::errors::{AgentError, Result};

/// Handle asserting that one agent instance currently owns the role.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a handle for the given well-known location.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the handle file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register the current process as the running instance.
    ///
    /// Fails with `AlreadyRunning` if a handle exists and the referenced
    /// process is alive. A stale handle (dead process) is silently replaced.
    pub fn register(&self) -> Result<()> {
        if let Some(pid) = self.live_pid() {
            return Err(AgentError::AlreadyRunning { pid });
        }
        self.write(process::id())
    }

    /// Write an explicit PID into the handle file.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| AgentError::io(parent, source))?;
        }
        fs::write(&self.path, format!("{pid}\n"))
            .map_err(|source| AgentError::io(&self.path, source))
    }

    /// Recorded PID, regardless of liveness. The caller decides validity.
    #[must_use]
    pub fn read(&self) -> Option<u32> {
        let raw = fs::read_to_string(&self.path).ok()?;
        raw.trim().parse().ok()
    }

    /// Recorded PID, only when the referenced process is alive.
    #[must_use]
    pub fn live_pid(&self) -> Option<u32> {
        self.read().filter(|pid| process_alive(*pid))
    }

    /// Unconditionally remove the handle file. A missing file is not an
    /// error; used before a fresh start to discard stale state.
    pub fn clean(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AgentError::io(&self.path, source)),
        }
    }
}

/// Whether a process with the given PID is alive.
///
/// Signal 0 probes existence without delivering anything; EPERM means the
/// process exists but belongs to another user, which still counts as alive.
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
#[must_use]
pub fn process_alive(_pid: u32) -> bool {
    false
}
