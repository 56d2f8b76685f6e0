//! ## acmsim-cli
//! **Command line front end of the link simulator**
//!
//! `acmsim run` simulates the configured scenario and prints the report as
//! YAML; `acmsim check-config` only loads and validates the configuration.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    commands::run_command(Cli::parse())
}
