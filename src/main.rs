use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod config;
mod credentials;
mod jsonapi;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Deploy(deploy) => workflow::run_deploy(&args, deploy),
    }
}

/// Logs go to stderr; stdout carries only the command result.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "warn,applura=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
