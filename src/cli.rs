//! Command-line interface for netrig
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// netrig - declarative Linux network topology rig
#[derive(Parser)]
#[command(name = "netrig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Topology file (TOML); the built-in dual-namespace demo when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// What to do with the topology
    #[arg(value_enum)]
    pub action: Action,
}

/// Topology action
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Build the topology (idempotent)
    Add,
    /// Tear the topology down (best-effort)
    Delete,
}
