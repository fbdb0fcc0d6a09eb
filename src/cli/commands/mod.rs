//! Subcommands module for netcfg CLI

pub mod apply;
pub mod list;
pub mod rollback;

use crate::cli::output::OutputFormatter;
use anyhow::{bail, Result};
use netcfg::config::{Config, DeviceSettings};
use netcfg::fleet::FleetRunner;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration, with the inventory loaded
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
    /// Compare and discard instead of committing
    pub check_mode: bool,
    /// Device name filter
    pub limit: Option<String>,
    /// Number of devices worked on at once
    pub forks: usize,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, mut config: Config) -> Self {
        if let Some(forks) = cli.forks {
            config.defaults.forks = forks;
        }
        if let Some(timeout) = cli.timeout {
            config.defaults.timeout = timeout;
        }

        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity())
            .with_colors(&config.colors);

        Self {
            forks: config.defaults.forks,
            config,
            output,
            verbosity: cli.verbosity(),
            check_mode: cli.check_mode,
            limit: cli.limit.clone(),
        }
    }

    /// Resolve the named devices, or every inventory device when `names` is
    /// empty, then apply `--limit`.
    pub fn select_devices(&self, names: &[String]) -> Result<Vec<DeviceSettings>> {
        let entries: Vec<_> = if names.is_empty() {
            self.config.devices.iter().collect()
        } else {
            names
                .iter()
                .map(|name| match self.config.device(name) {
                    Some(device) => Ok(device),
                    None => bail!("Device '{}' is not in the inventory", name),
                })
                .collect::<Result<_>>()?
        };

        let selected = entries
            .into_iter()
            .filter(|device| {
                self.limit
                    .as_deref()
                    .map_or(true, |pattern| device.name.contains(pattern))
            })
            .map(|device| self.config.resolve_device(device))
            .collect::<Result<Vec<_>>>()?;

        if selected.is_empty() {
            bail!("No devices selected");
        }
        Ok(selected)
    }

    /// Fleet runner honoring `--forks` and `--check`
    pub fn runner(&self) -> FleetRunner {
        FleetRunner::new(self.forks).check(self.check_mode)
    }
}
