//! Rollback command.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use netcfg::fleet::FleetOperation;

/// Arguments for the rollback command
#[derive(Parser, Debug, Clone)]
pub struct RollbackArgs {
    /// Devices to roll back (default: the whole inventory)
    pub devices: Vec<String>,
}

impl RollbackArgs {
    /// Restore the rollback point on every selected device
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let devices = ctx.select_devices(&self.devices)?;

        if ctx.check_mode {
            ctx.output.warning("Rollback has no check mode; nothing was changed");
            for device in &devices {
                ctx.output.info(&format!("would roll back: [{}]", device.name));
            }
            return Ok(0);
        }

        ctx.output.banner("ROLLBACK");
        let report = ctx
            .runner()
            .run(&devices, &FleetOperation::Rollback)
            .await;

        for device in &report.devices {
            ctx.output.device_result(device);
        }
        ctx.output.recap(&report);

        Ok(if report.has_divergence() {
            3
        } else if report.has_failures() {
            2
        } else {
            0
        })
    }
}
