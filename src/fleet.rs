//! Running one operation across many devices.
//!
//! Each device gets its own [`Driver`] and its own tokio task; at most
//! `forks` of them talk to devices at the same time. Every device ends up
//! with exactly one [`DeviceReport`], whatever happened to it.

use crate::config::DeviceSettings;
use crate::driver::Driver;
use crate::error::Error;
use crate::transaction::{CandidateSource, ConfigDiff, DeviceLocks};
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Where each device's candidate comes from.
#[derive(Debug, Clone)]
pub enum Candidates {
    /// The same candidate for every device
    Shared(CandidateSource),
    /// `<dir>/<device>.cfg` for each device
    Directory(PathBuf),
}

impl Candidates {
    /// Candidate for the named device
    pub fn for_device(&self, device: &str) -> CandidateSource {
        match self {
            Candidates::Shared(source) => source.clone(),
            Candidates::Directory(dir) => CandidateSource::file(dir.join(format!("{device}.cfg"))),
        }
    }
}

/// What to do on every device.
#[derive(Debug, Clone)]
pub enum FleetOperation {
    /// Replace running config with the candidate
    Replace(Candidates),
    /// Merge the candidate into running config
    Merge(Candidates),
    /// Restore each device's rollback point
    Rollback,
}

impl FleetOperation {
    /// Short name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            FleetOperation::Replace(_) => "replace",
            FleetOperation::Merge(_) => "merge",
            FleetOperation::Rollback => "rollback",
        }
    }
}

/// How one device ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// Candidate matched running config; nothing was applied
    Unchanged,
    /// Candidate differed and was committed
    Changed,
    /// Candidate differed; check mode discarded it
    Pending,
    /// Rollback point restored
    RolledBack,
    /// The session could not be opened
    Unreachable,
    /// The operation failed and running config was left unchanged
    Failed,
    /// Running config changed but could not be persisted
    Diverged,
}

impl DeviceOutcome {
    /// Whether the device needs attention
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeviceOutcome::Unreachable | DeviceOutcome::Failed | DeviceOutcome::Diverged
        )
    }
}

impl std::fmt::Display for DeviceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceOutcome::Unchanged => "ok",
            DeviceOutcome::Changed => "changed",
            DeviceOutcome::Pending => "pending",
            DeviceOutcome::RolledBack => "rolled back",
            DeviceOutcome::Unreachable => "unreachable",
            DeviceOutcome::Failed => "failed",
            DeviceOutcome::Diverged => "DIVERGED",
        };
        write!(f, "{}", s)
    }
}

/// Result for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: String,
    pub outcome: DeviceOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<ConfigDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl DeviceReport {
    fn new(device: impl Into<String>, outcome: DeviceOutcome, started: Instant) -> Self {
        Self {
            device: device.into(),
            outcome,
            diff: None,
            error: None,
            elapsed: started.elapsed(),
        }
    }

    fn with_diff(mut self, diff: Option<ConfigDiff>) -> Self {
        self.diff = diff;
        self
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Outcome of a fleet run, one report per device in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetReport {
    pub devices: Vec<DeviceReport>,
}

impl FleetReport {
    /// Reports with the given outcome
    pub fn with_outcome(&self, outcome: DeviceOutcome) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(move |r| r.outcome == outcome)
    }

    /// Whether any device failed, was unreachable or diverged
    pub fn has_failures(&self) -> bool {
        self.devices.iter().any(|r| r.outcome.is_failure())
    }

    /// Whether any device diverged
    pub fn has_divergence(&self) -> bool {
        self.with_outcome(DeviceOutcome::Diverged).next().is_some()
    }
}

/// Runs one operation on many devices with bounded concurrency.
#[derive(Debug, Clone)]
pub struct FleetRunner {
    semaphore: Arc<Semaphore>,
    locks: DeviceLocks,
    check: bool,
}

impl FleetRunner {
    /// Runner allowing `forks` devices in flight at once
    pub fn new(forks: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(forks.max(1))),
            locks: DeviceLocks::new(),
            check: false,
        }
    }

    /// Compare and discard instead of committing
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Share a lock registry with other runners or drivers
    pub fn locks(mut self, locks: DeviceLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Lock registry used for drivers built from settings
    pub fn device_locks(&self) -> &DeviceLocks {
        &self.locks
    }

    /// Build a driver per device and run `operation` on each.
    pub async fn run(&self, devices: &[DeviceSettings], operation: &FleetOperation) -> FleetReport {
        let drivers = devices
            .iter()
            .map(|settings| Driver::from_settings(settings, self.locks.clone()))
            .collect();
        self.run_drivers(drivers, operation).await
    }

    /// Run `operation` on each of `drivers`.
    pub async fn run_drivers(&self, drivers: Vec<Driver>, operation: &FleetOperation) -> FleetReport {
        info!(
            operation = operation.name(),
            devices = drivers.len(),
            check = self.check,
            "Starting fleet run"
        );

        let names: Vec<String> = drivers.iter().map(|d| d.host().to_string()).collect();
        let handles: Vec<_> = drivers
            .into_iter()
            .map(|driver| {
                let semaphore = Arc::clone(&self.semaphore);
                let operation = operation.clone();
                let check = self.check;

                tokio::spawn(async move {
                    let started = Instant::now();
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return DeviceReport::new(
                                driver.host(),
                                DeviceOutcome::Failed,
                                started,
                            )
                            .with_error(e)
                        }
                    };
                    run_device(driver, &operation, check, started).await
                })
            })
            .collect();

        let devices = join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, device)| {
                joined.unwrap_or_else(|e| {
                    error!(host = %device, error = %e, "Device task panicked");
                    DeviceReport::new(device, DeviceOutcome::Failed, Instant::now()).with_error(e)
                })
            })
            .collect();

        FleetReport { devices }
    }
}

async fn run_device(
    mut driver: Driver,
    operation: &FleetOperation,
    check: bool,
    started: Instant,
) -> DeviceReport {
    let host = driver.host().to_string();

    if let Err(e) = driver.open().await {
        warn!(host = %host, error = %e, "Device unreachable");
        return DeviceReport::new(host, DeviceOutcome::Unreachable, started).with_error(e);
    }

    let result = match operation {
        FleetOperation::Replace(candidates) => {
            let source = candidates.for_device(&host);
            driver
                .load_replace_candidate(source)
                .await
                .map_err(|e| (e, None))
        }
        FleetOperation::Merge(candidates) => {
            let source = candidates.for_device(&host);
            driver
                .load_merge_candidate(source)
                .await
                .map_err(|e| (e, None))
        }
        FleetOperation::Rollback => match driver.rollback().await {
            Ok(()) => {
                close_quietly(&mut driver).await;
                return DeviceReport::new(host, DeviceOutcome::RolledBack, started);
            }
            Err(e) => Err((e, None)),
        },
    };

    let result = match result {
        Ok(()) => finish_staged(&mut driver, check).await,
        Err(e) => Err(e),
    };

    close_quietly(&mut driver).await;

    match result {
        Ok((outcome, diff)) => {
            debug!(host = %host, outcome = %outcome, "Device done");
            DeviceReport::new(host, outcome, started).with_diff(diff)
        }
        Err((e, diff)) => {
            let outcome = if e.is_divergence() {
                DeviceOutcome::Diverged
            } else {
                DeviceOutcome::Failed
            };
            warn!(host = %host, error = %e, "Device failed");
            DeviceReport::new(host, outcome, started)
                .with_diff(diff)
                .with_error(e)
        }
    }
}

type StagedResult = std::result::Result<(DeviceOutcome, Option<ConfigDiff>), (Error, Option<ConfigDiff>)>;

async fn finish_staged(driver: &mut Driver, check: bool) -> StagedResult {
    let diff = match driver.compare_config().await {
        Ok(diff) => diff,
        Err(e) => {
            discard_quietly(driver).await;
            return Err((e, None));
        }
    };

    if diff.is_empty() {
        discard_quietly(driver).await;
        return Ok((DeviceOutcome::Unchanged, None));
    }

    if check {
        discard_quietly(driver).await;
        return Ok((DeviceOutcome::Pending, Some(diff)));
    }

    match driver.commit_config().await {
        Ok(()) => Ok((DeviceOutcome::Changed, Some(diff))),
        Err(e) => Err((e, Some(diff))),
    }
}

async fn discard_quietly(driver: &mut Driver) {
    if let Err(e) = driver.discard_config().await {
        warn!(host = %driver.host(), error = %e, "Discard failed");
    }
}

async fn close_quietly(driver: &mut Driver) {
    if let Err(e) = driver.close().await {
        debug!(host = %driver.host(), error = %e, "Close failed");
    }
}
