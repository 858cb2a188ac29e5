//! CLI command definitions

use clap::Args;

/// Enroll and run a plan layout
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to plan layout YAML file
    #[arg(short, long)]
    pub file: String,

    /// Keep execution records in memory instead of the history database
    #[arg(long)]
    pub in_memory: bool,
}

/// Validate a plan layout
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to plan layout YAML file
    #[arg(short, long)]
    pub file: String,
}

/// Show plan execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,
}
