//! Daemon subsystem: lifecycle control, supervision loop, backgrounding,
//! signal handling, watchdog, and the single-instance PID file.

#[cfg(feature = "daemon")]
pub mod control;
#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod pidfile;
#[cfg(feature = "daemon")]
pub mod service;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod watchdog;
