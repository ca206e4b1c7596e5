//
// main.rs
// Ceph-Tools-rs
//
// Binary entry point: parses arguments, installs the log subscriber and hands off to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use ceph_tools::cli::{self, Cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries reports only
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli::run(cli)
}
