//! Backgrounding: the single "become a background service" operation.
//!
//! Classic double-fork: the first fork's parent exits so the shell regains
//! the prompt, setsid detaches from the controlling terminal, and the second
//! fork guarantees the daemon can never reacquire one. Standard streams are
//! redirected to /dev/null. The supervision loop itself never calls this —
//! only the `start` path does — so tests drive the loop in foreground mode.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::process;

use fork::{Fork, fork, setsid};

use crate::core::errors::{AgentError, Result};

/// Detach from the terminal and continue as a background process.
///
/// On success the caller is the final daemon process, running in its own
/// session with stdio pointed at /dev/null and `/` as working directory.
/// Intermediate processes exit 0 and never return.
pub fn daemonize() -> Result<()> {
    match fork().map_err(|errno| daemonize_error("first fork", errno))? {
        Fork::Parent(_child) => process::exit(0),
        Fork::Child => {}
    }

    setsid().map_err(|errno| daemonize_error("setsid", errno))?;

    match fork().map_err(|errno| daemonize_error("second fork", errno))? {
        Fork::Parent(_grandchild) => process::exit(0),
        Fork::Child => {}
    }

    // Don't pin a mount point for the daemon's lifetime.
    nix::unistd::chdir("/").map_err(|errno| AgentError::Daemonize {
        details: format!("chdir /: {errno}"),
    })?;

    redirect_standard_streams()
}

/// Point stdin, stdout, and stderr at /dev/null.
fn redirect_standard_streams() -> Result<()> {
    let devnull = File::options()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|source| AgentError::io("/dev/null", source))?;

    for stdfd in [0, 1, 2] {
        nix::unistd::dup2(devnull.as_raw_fd(), stdfd).map_err(|errno| AgentError::Daemonize {
            details: format!("dup2 onto fd {stdfd}: {errno}"),
        })?;
    }
    Ok(())
}

fn daemonize_error(stage: &str, errno: i32) -> AgentError {
    AgentError::Daemonize {
        details: format!("{stage} failed with errno {errno}"),
    }
}
