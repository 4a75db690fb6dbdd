//! `tagent` binary entry point.

use clap::Parser as _;

use telemetry_agent::cli_app::{Cli, run};

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}
