//! List the device inventory.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use netcfg::vendor::adapter_for;
use serde::Serialize;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Show adapter capabilities as well
    #[arg(long)]
    pub capabilities: bool,
}

#[derive(Debug, Serialize)]
struct DeviceRow {
    name: String,
    host: String,
    platform: String,
    transport: String,
    adapter: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback_point: Option<String>,
}

impl ListArgs {
    /// Print every selected device
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let devices = if ctx.config.devices.is_empty() {
            Vec::new()
        } else {
            ctx.select_devices(&[])?
        };

        let rows: Vec<DeviceRow> = devices
            .iter()
            .map(|device| {
                let adapter = adapter_for(device.platform, device.adapter.clone());
                DeviceRow {
                    name: device.name.clone(),
                    host: device.host.clone(),
                    platform: device.platform.to_string(),
                    transport: device.transport.to_string(),
                    adapter: adapter.name(),
                    rollback_point: adapter.rollback_point().map(|p| p.to_string()),
                }
            })
            .collect();

        if ctx.output.is_json() {
            ctx.output.json(&rows);
            return Ok(0);
        }

        ctx.output.section(&format!("Devices ({})", rows.len()));
        for (row, device) in rows.iter().zip(&devices) {
            ctx.output.info(&format!(
                "{:<24} {:<20} {:<12} {:<5} {}",
                row.name, row.host, row.platform, row.transport, row.adapter
            ));
            if self.capabilities {
                let caps = adapter_for(device.platform, device.adapter.clone()).capabilities();
                ctx.output.info(&format!(
                    "    replace={} merge={} rollback={} atomic={} diff={:?}",
                    caps.replace, caps.merge, caps.rollback, caps.atomic_apply, caps.diff_fidelity
                ));
                if let Some(point) = &row.rollback_point {
                    ctx.output.info(&format!("    rollback point: {}", point));
                }
            }
        }
        Ok(0)
    }
}
