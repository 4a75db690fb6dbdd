//! Cooperative shutdown flag set by SIGTERM.
//!
//! The supervision loop polls the flag only at its two boundaries (before a
//! new cycle, before sleeping), so an in-progress cycle always finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::errors::{AgentError, Result};

/// Shared run flag flipped by signal delivery.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Flag wired to SIGTERM. SIGTERM is the only signal the agent handles.
    pub fn for_termination() -> Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag)).map_err(
            |source| AgentError::Runtime {
                details: format!("registering SIGTERM handler: {source}"),
            },
        )?;
        Ok(Self { flag })
    }

    /// Flag with no signal registration, flipped via [`Self::request_shutdown`].
    /// Used by tests and embedded drivers.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Request shutdown without a signal.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::ShutdownFlag;

    #[test]
    fn manual_flag_starts_clear() {
        let flag = ShutdownFlag::manual();
        assert!(!flag.should_shutdown());
    }

    #[test]
    fn request_is_visible_through_clones() {
        let flag = ShutdownFlag::manual();
        let observer = flag.clone();
        flag.request_shutdown();
        assert!(observer.should_shutdown());
    }

    #[test]
    fn sigterm_registration_succeeds() {
        let flag = ShutdownFlag::for_termination().unwrap();
        assert!(!flag.should_shutdown());
    }
}
