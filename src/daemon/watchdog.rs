//! Watchdog timer: self-termination guard independent of normal control flow.
//!
//! Once armed, a detached tick thread holds the deadline. The supervision
//! loop resets it after every successful cycle — never before — so a wedge
//! inside the collector triggers the kill. The expiry action is unconditional
//! process termination: cooperative cancellation inside a stuck call cannot
//! be assumed, so an uncoordinated external kill is the only reliable
//! backstop. The tick thread never reads loop state and takes no locks
//! shared with application logic beyond the deadline itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Action taken when the deadline expires without a reset.
type TerminateAction = Box<dyn Fn() + Send + 'static>;

/// An armed watchdog. Dropping it disarms the tick thread.
#[derive(Debug)]
pub struct Watchdog {
    deadline: Arc<Mutex<Instant>>,
    armed: Arc<AtomicBool>,
    timeout: Duration,
}

impl Watchdog {
    /// Arm with the given timeout. On expiry the process is killed with
    /// SIGKILL — deliberately skipping destructors and the clean-shutdown
    /// path, so the status record survives as evidence of the wedge.
    #[must_use]
    pub fn arm(timeout: Duration) -> Self {
        Self::arm_with_action(timeout, Box::new(terminate_process))
    }

    /// Arm with an injected expiry action. Production code uses [`Self::arm`];
    /// tests observe expiry through a flag instead of dying.
    #[must_use]
    pub fn arm_with_action(timeout: Duration, action: TerminateAction) -> Self {
        let deadline = Arc::new(Mutex::new(Instant::now() + timeout));
        let armed = Arc::new(AtomicBool::new(true));

        let thread_deadline = Arc::clone(&deadline);
        let thread_armed = Arc::clone(&armed);
        let tick = tick_interval(timeout);
        // Detached on purpose: the thread either observes disarm and exits,
        // or fires the terminate action.
        let _ = thread::Builder::new()
            .name("tagent-watchdog".to_string())
            .spawn(move || {
                loop {
                    thread::sleep(tick);
                    if !thread_armed.load(Ordering::Relaxed) {
                        return;
                    }
                    let expired = Instant::now() >= *thread_deadline.lock();
                    if expired {
                        eprintln!(
                            "[TAGENT-WATCHDOG] no cycle completed within {}s, terminating",
                            timeout.as_secs()
                        );
                        action();
                        return;
                    }
                }
            });

        Self {
            deadline,
            armed,
            timeout,
        }
    }

    /// Push the deadline out by one timeout. Idempotent and cheap; called
    /// after every successful cycle.
    pub fn reset(&self) {
        *self.deadline.lock() = Instant::now() + self.timeout;
    }

    /// Stop the tick thread. The clean-shutdown path.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Relaxed);
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Tick granularity: a tenth of the timeout, clamped to [10ms, 1s].
fn tick_interval(timeout: Duration) -> Duration {
    (timeout / 10).clamp(Duration::from_millis(10), Duration::from_secs(1))
}

#[cfg(unix)]
fn terminate_process() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let _ = kill(Pid::this(), Signal::SIGKILL);
    // Unreachable after SIGKILL; kept so a failed kill still ends the process.
    std::process::abort();
}

#[cfg(not(unix))]
fn terminate_process() {
    std::process::abort();
}
