//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, RunCommand, ValidateCommand};

/// Plan execution engine
#[derive(Debug, Parser, Clone)]
#[command(name = "planrun")]
#[command(version = "0.1.0")]
#[command(about = "Run compiled pipeline plans", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Enroll and run a plan layout
    Run(RunCommand),

    /// Validate a plan layout
    Validate(ValidateCommand),

    /// Show plan execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }
}
