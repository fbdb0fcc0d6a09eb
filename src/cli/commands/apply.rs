//! Compare, replace and merge commands.

use super::CommandContext;
use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use netcfg::fleet::{Candidates, DeviceOutcome, FleetOperation};
use netcfg::transaction::{CandidateSource, StagingMode};
use std::path::PathBuf;

/// Where the candidate comes from and which devices get it
#[derive(Parser, Debug, Clone)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["candidate", "candidate_dir", "text"])
))]
pub struct CandidateArgs {
    /// Devices to work on (default: the whole inventory)
    pub devices: Vec<String>,

    /// Candidate file sent to every selected device
    #[arg(short = 'C', long)]
    pub candidate: Option<PathBuf>,

    /// Directory holding `<device>.cfg` per device
    #[arg(long)]
    pub candidate_dir: Option<PathBuf>,

    /// Inline candidate text
    #[arg(long)]
    pub text: Option<String>,
}

impl CandidateArgs {
    /// Candidates for the fleet runner
    pub fn candidates(&self) -> Result<Candidates> {
        if let Some(path) = &self.candidate {
            if !path.is_file() {
                bail!("Candidate file not found: {}", path.display());
            }
            return Ok(Candidates::Shared(CandidateSource::file(path)));
        }
        if let Some(dir) = &self.candidate_dir {
            if !dir.is_dir() {
                bail!("Candidate directory not found: {}", dir.display());
            }
            return Ok(Candidates::Directory(dir.clone()));
        }
        match &self.text {
            Some(text) => Ok(Candidates::Shared(CandidateSource::text(text.clone()))),
            None => bail!("No candidate given"),
        }
    }

    /// Stage with `mode` on every selected device; `force_check` compares
    /// and discards regardless of `--check`.
    pub async fn execute(
        &self,
        ctx: &mut CommandContext,
        mode: StagingMode,
        force_check: bool,
    ) -> Result<i32> {
        let devices = ctx.select_devices(&self.devices)?;
        let candidates = self.candidates()?;
        let operation = match mode {
            StagingMode::Replace => FleetOperation::Replace(candidates),
            StagingMode::Merge => FleetOperation::Merge(candidates),
        };
        let check = force_check || ctx.check_mode;

        let title = match (mode, check) {
            (StagingMode::Replace, true) => "COMPARE",
            (StagingMode::Replace, false) => "REPLACE",
            (StagingMode::Merge, true) => "MERGE (CHECK)",
            (StagingMode::Merge, false) => "MERGE",
        };
        ctx.output.banner(title);
        ctx.output
            .debug(&format!("{} device(s), forks={}", devices.len(), ctx.forks));

        let report = ctx.runner().check(check).run(&devices, &operation).await;

        for device in &report.devices {
            ctx.output.device_result(device);
        }
        ctx.output.recap(&report);

        let code = if report.has_divergence() {
            3
        } else if report.has_failures() {
            2
        } else if check && report.with_outcome(DeviceOutcome::Pending).next().is_some() {
            // Pending changes are reported like `diff`: exit 1
            1
        } else {
            0
        };
        Ok(code)
    }
}
