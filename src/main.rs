//! netrig: stand up and tear down multi-namespace network topologies
//!
//! `netrig add` builds a topology, `netrig delete` tears it down. Both are
//! safe to re-run: errors from individual teardown steps are logged rather
//! than fatal, and the process exits non-zero only for usage errors,
//! unrecoverable setup failures, and a lost namespace context.

mod cli;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Action, Cli};
use netrig::config;
use netrig::error::Result;
use netrig::netlink::Channel;
use netrig::topology::Topology;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        if e.is_fatal_setup() {
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let topology = match &cli.config {
        Some(path) => config::load(path)?,
        None => Topology::dual_ns(),
    };
    let ch = Channel::new()?;
    match cli.action {
        Action::Add => topology.build(&ch),
        Action::Delete => topology.teardown(&ch),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
