//! Telemetry-collection daemon: watchdog-supervised collection cycles,
//! lifecycle management (start/stop/restart/foreground/status), and durable
//! run-status reporting.
//!
//! The supervision loop ([`daemon::loop_main::CollectorLoop`]) is the core:
//! it drives one [`collector::Collector`] cycle per configured interval,
//! feeds the [`daemon::watchdog::Watchdog`] after every completed cycle, and
//! persists a [`status::StatusRecord`] that external monitors can inspect
//! out-of-band. Shutdown is cooperative: SIGTERM flips a flag observed only
//! at loop boundaries, so an in-progress cycle always finishes.

pub mod collector;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod status;

#[cfg(feature = "cli")]
pub mod cli_app;
