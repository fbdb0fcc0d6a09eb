//! netcfg - configuration transactions for network devices
//!
//! This is the main entry point for the netcfg CLI.

mod cli;

use anyhow::{Context, Result};
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use netcfg::config::Config;
use netcfg::logging::init_logging;
use netcfg::transaction::StagingMode;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {:#}", e);
        Config::default()
    });

    init_logging(&config.logging, cli.verbosity());

    if cli.verbosity() >= 2 {
        eprintln!("netcfg v{} by {}", VERSION, AUTHORS);
    }

    if let Some(inventory) = &cli.inventory {
        let count = config
            .load_inventory(inventory)
            .with_context(|| format!("Failed to load inventory {}", inventory.display()))?;
        tracing::debug!(count, path = %inventory.display(), "Loaded inventory");
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    let result = match &cli.command {
        Commands::Compare(args) => args.execute(&mut ctx, StagingMode::Replace, true).await,
        Commands::Replace(args) => args.execute(&mut ctx, StagingMode::Replace, false).await,
        Commands::Merge(args) => args.execute(&mut ctx, StagingMode::Merge, false).await,
        Commands::Rollback(args) => args.execute(&mut ctx).await,
        Commands::List(args) => args.execute(&mut ctx).await,
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            2
        }
    };

    std::process::exit(exit_code);
}
