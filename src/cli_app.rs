//! Top-level CLI definition and dispatch.
//!
//! Exit codes: 0 on success (including informational "not running" answers),
//! 1 for lifecycle and configuration failures, 2 for usage errors (clap's
//! native behavior for unknown or missing commands).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize as _;

use crate::core::config::AgentConfig;
use crate::core::errors::AgentError;
use crate::daemon::control::{Agent, RunningStatus, StopOutcome};
use crate::status::StatusRecorder;

/// Telemetry-collection daemon with watchdog-supervised collection cycles.
#[derive(Debug, Parser)]
#[command(name = "tagent", version, about)]
pub struct Cli {
    /// Configuration file (default: /etc/telemetry-agent/agent.toml).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Discard the singleton handle before dispatching, forgetting a stale
    /// instance from a crashed prior run.
    #[arg(long, global = true)]
    pub clean: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Lifecycle commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon in the background.
    Start,
    /// Stop a running daemon and wait for it to exit.
    Stop,
    /// Stop (best effort) and start again.
    Restart,
    /// Run the supervision loop without detaching, for interactive use.
    Foreground,
    /// Report whether a daemon instance is running.
    Status,
    /// Print the last persisted run-status record.
    #[command(name = "check_status", alias = "check-status")]
    CheckStatus,
}

/// Dispatch a parsed command line. Returns the process exit code.
#[must_use]
pub fn run(cli: &Cli) -> i32 {
    let config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("tagent: {err}");
            return 1;
        }
    };

    let agent = Agent::new(config.clone());

    if cli.clean
        && let Err(err) = agent.pid_file().clean()
    {
        eprintln!("tagent: {err}");
        return 1;
    }

    match &cli.command {
        Command::Start => lifecycle_exit(agent.start()),
        Command::Restart => lifecycle_exit(agent.restart()),
        Command::Foreground => lifecycle_exit(agent.foreground()),
        Command::Stop => match agent.stop() {
            Ok(StopOutcome::NotRunning) => {
                println!("tagent is not running.");
                0
            }
            Ok(StopOutcome::Stopped { pid }) => {
                println!("tagent (pid {pid}) stopped.");
                0
            }
            Err(err) => {
                eprintln!("tagent: {err}");
                1
            }
        },
        Command::Status => {
            match agent.status() {
                RunningStatus::Running { pid } => {
                    println!("tagent is {} as pid {pid}.", "running".green());
                }
                RunningStatus::NotRunning => {
                    println!("tagent is {}.", "not running".red());
                }
            }
            0
        }
        Command::CheckStatus => {
            match StatusRecorder::new(config.paths.status_file.clone()).print_latest() {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("tagent: {err}");
                    1
                }
            }
        }
    }
}

fn lifecycle_exit(result: Result<(), AgentError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("tagent: {err}");
            1
        }
    }
}
