//! CLI module for netcfg
//!
//! Argument parsing, output formatting and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// netcfg - configuration transactions for network devices
///
/// Stage a candidate configuration, review the diff, and commit or discard
/// it on one device or a whole inventory.
#[derive(Parser, Debug, Clone)]
#[command(name = "netcfg")]
#[command(author = "netcfg Contributors")]
#[command(version)]
#[command(about = "Configuration transactions for network devices", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Extra device inventory file (TOML, YAML or JSON `devices` list)
    #[arg(short = 'i', long, global = true, env = "NETCFG_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Compare, then discard instead of committing
    #[arg(long = "check", global = true)]
    pub check_mode: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Limit to devices whose name contains this pattern
    #[arg(short = 'l', long, global = true)]
    pub limit: Option<String>,

    /// Number of devices worked on at once
    #[arg(short = 'f', long, global = true)]
    pub forks: Option<usize>,

    /// Per round-trip timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "NETCFG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show what a replace candidate would change, then discard it
    Compare(commands::apply::CandidateArgs),

    /// Replace running configuration with a candidate
    Replace(commands::apply::CandidateArgs),

    /// Merge a candidate into running configuration
    Merge(commands::apply::CandidateArgs),

    /// Restore the configuration saved before the last commit
    Rollback(commands::rollback::RollbackArgs),

    /// List devices in the inventory
    List(commands::list::ListArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}
