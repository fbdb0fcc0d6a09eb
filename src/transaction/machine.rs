//! The configuration transaction state machine.
//!
//! ```text
//!            load ok                 commit / discard
//!   IDLE ──────────────> STAGED ─────────────────────> COMMITTED | DISCARDED
//!    │  ╲                  │                                   │
//!    │   ╲ load failed     │ load → SessionLocked              │
//!    │    ╲─────> IDLE     ╰──────                             ╰──> IDLE
//!    │ rollback
//!    ╰──────────> ROLLED BACK ──> IDLE
//! ```
//!
//! The machine holds the device lock for exactly as long as a candidate is
//! staged, and is the only place adapter failures are turned into
//! [`Error`]s. The split between `apply` and `persist` lets it tell a change
//! that never took effect apart from one that took effect but will not
//! survive a restart.

use super::lock::{DeviceLock, DeviceLocks};
use super::types::{
    CandidateConfig, CandidateSource, ConfigDiff, StagingMode, TransactionState, Transition,
};
use crate::connection::Connection;
use crate::error::{DivergentOperation, Error, Result};
use crate::vendor::{AdapterError, VendorAdapter};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Staged {
    candidate: CandidateConfig,
    _lock: DeviceLock,
}

/// Lifecycle of configuration changes for one device.
pub struct TransactionStateMachine {
    host: String,
    lock_key: String,
    owner: String,
    locks: DeviceLocks,
    staged: Option<Staged>,
    last_transition: Option<Transition>,
}

impl TransactionStateMachine {
    /// Machine for `host`, taking locks from `locks`
    pub fn new(host: impl Into<String>, locks: DeviceLocks) -> Self {
        let host = host.into();
        let owner = format!("netcfg-{}", &Uuid::new_v4().simple().to_string()[..8]);
        Self {
            lock_key: host.clone(),
            host,
            owner,
            locks,
            staged: None,
            last_transition: None,
        }
    }

    /// Take locks under `key` instead of the host name.
    ///
    /// Inventory names are aliases; two names reaching the same device must
    /// share one key.
    pub fn with_lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = key.into();
        self
    }

    /// Device this machine controls
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Key this machine's lock is held under
    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    /// Lock owner name used by this machine
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Current state.
    ///
    /// `Loading` and the terminal states only exist inside an operation, so
    /// between operations this is always `Idle` or `Staged`. A cancelled
    /// operation future leaves the machine `Idle`, since the staged candidate
    /// and its lock are only stored once staging completes.
    pub fn state(&self) -> TransactionState {
        match &self.staged {
            Some(staged) => TransactionState::Staged(staged.candidate.mode),
            None => TransactionState::Idle,
        }
    }

    /// The staged candidate, if any
    pub fn candidate(&self) -> Option<&CandidateConfig> {
        self.staged.as_ref().map(|s| &s.candidate)
    }

    /// Whether a candidate is staged (and the lock held)
    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// The most recent commit, discard or rollback
    pub fn last_transition(&self) -> Option<&Transition> {
        self.last_transition.as_ref()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Stage a candidate. Valid from `Idle` only.
    pub async fn load(
        &mut self,
        adapter: &dyn VendorAdapter,
        session: &dyn Connection,
        mode: StagingMode,
        source: CandidateSource,
    ) -> Result<()> {
        let operation = match mode {
            StagingMode::Replace => "load_replace_candidate",
            StagingMode::Merge => "load_merge_candidate",
        };

        if let Some(staged) = &self.staged {
            return Err(Error::SessionLocked {
                host: self.host.clone(),
                holder: format!(
                    "this session ({} candidate staged at {})",
                    staged.candidate.mode,
                    staged.candidate.staged_at.to_rfc3339()
                ),
            });
        }

        let caps = adapter.capabilities();
        if !caps.supports_mode(mode) {
            return Err(self.unsupported(
                operation,
                format!("the {} adapter cannot stage a {} candidate", adapter.name(), mode),
            ));
        }
        if !caps.supports_source(source.kind()) {
            return Err(self.unsupported(
                operation,
                format!(
                    "the {} adapter cannot stage a candidate from {}",
                    adapter.name(),
                    source.kind()
                ),
            ));
        }

        let lock = self
            .locks
            .try_acquire(&self.lock_key, &self.owner)
            .map_err(|holder| Error::SessionLocked {
                host: self.host.clone(),
                holder,
            })?;

        debug!(host = %self.host, mode = %mode, source = %source, state = %TransactionState::Loading, "Loading candidate");

        match adapter.stage(session, mode, &source).await {
            Ok(target) => {
                info!(host = %self.host, mode = %mode, target = %target, "Candidate staged");
                self.staged = Some(Staged {
                    candidate: CandidateConfig::new(source, target, mode),
                    _lock: lock,
                });
                Ok(())
            }
            Err(e) => {
                drop(lock);
                warn!(host = %self.host, mode = %mode, error = %e, "Load failed");
                Err(self.staging_error(mode, operation, e))
            }
        }
    }

    /// Diff the staged candidate against running config.
    ///
    /// With nothing staged the diff is empty. Never changes state.
    pub async fn compare(
        &self,
        adapter: &dyn VendorAdapter,
        session: &dyn Connection,
    ) -> Result<ConfigDiff> {
        let Some(staged) = &self.staged else {
            return Ok(ConfigDiff::empty(adapter.capabilities().diff_fidelity));
        };
        adapter
            .compare(session, &staged.candidate)
            .await
            .map_err(|e| self.device_error("compare_config", e))
    }

    /// Apply and persist the staged candidate.
    ///
    /// Always ends in `Idle` with the lock released, whatever the outcome.
    pub async fn commit(
        &mut self,
        adapter: &dyn VendorAdapter,
        session: &dyn Connection,
    ) -> Result<()> {
        let staged = self.staged.take().ok_or_else(|| Error::NothingStaged {
            host: self.host.clone(),
        })?;
        let mode = staged.candidate.mode;
        info!(host = %self.host, mode = %mode, target = %staged.candidate.target, "Committing candidate");

        if let Err(e) = adapter.apply(session, &staged.candidate).await {
            warn!(host = %self.host, error = %e, "Apply failed");
            if let Err(cleanup) = adapter.discard(session, &staged.candidate).await {
                warn!(host = %self.host, error = %cleanup, "Could not clean up staged candidate");
            }
            drop(staged);
            self.finish(TransactionState::Committed, false);
            return Err(self.staging_error(mode, "commit_config", e));
        }

        let persisted = adapter.persist(session).await;
        drop(staged);
        match persisted {
            Ok(()) => {
                self.finish(TransactionState::Committed, true);
                info!(host = %self.host, "Candidate committed");
                Ok(())
            }
            Err(e) => {
                self.finish(TransactionState::Committed, false);
                Err(self.divergence(DivergentOperation::Commit, e))
            }
        }
    }

    /// Abandon the staged candidate. A no-op when nothing is staged.
    pub async fn discard(
        &mut self,
        adapter: &dyn VendorAdapter,
        session: &dyn Connection,
    ) -> Result<()> {
        let Some(staged) = self.staged.take() else {
            debug!(host = %self.host, "Nothing staged to discard");
            return Ok(());
        };

        let result = adapter.discard(session, &staged.candidate).await;
        drop(staged);
        self.finish(TransactionState::Discarded, result.is_ok());
        match result {
            Ok(()) => {
                info!(host = %self.host, "Candidate discarded");
                Ok(())
            }
            Err(e) => Err(self.device_error("discard_config", e)),
        }
    }

    /// Drop the staged candidate and release the lock without touching the
    /// device. Used when the session is already gone.
    pub fn abort(&mut self) -> Option<CandidateConfig> {
        let staged = self.staged.take()?;
        warn!(host = %self.host, target = %staged.candidate.target, "Transaction aborted");
        self.finish(TransactionState::Discarded, false);
        Some(staged.candidate)
    }

    /// Restore the adapter's rollback point and persist it. Valid from
    /// `Idle` only.
    pub async fn rollback(
        &mut self,
        adapter: &dyn VendorAdapter,
        session: &dyn Connection,
    ) -> Result<()> {
        if let Some(staged) = &self.staged {
            return Err(Error::SessionLocked {
                host: self.host.clone(),
                holder: format!("this session ({} candidate staged)", staged.candidate.mode),
            });
        }
        if !adapter.capabilities().rollback {
            return Err(self.unsupported(
                "rollback",
                format!("the {} adapter keeps no rollback point", adapter.name()),
            ));
        }

        let lock = self
            .locks
            .try_acquire(&self.lock_key, &self.owner)
            .map_err(|holder| Error::SessionLocked {
                host: self.host.clone(),
                holder,
            })?;

        let point = adapter
            .rollback_point()
            .map(|p| p.location)
            .unwrap_or_default();
        info!(host = %self.host, rollback_point = %point, "Rolling back");

        if let Err(e) = adapter.restore_rollback_point(session).await {
            drop(lock);
            self.finish(TransactionState::RolledBack, false);
            return Err(match e {
                AdapterError::Unsupported(reason) => self.unsupported("rollback", reason),
                other => Error::RollbackFailed {
                    host: self.host.clone(),
                    message: other.to_string(),
                },
            });
        }

        let persisted = adapter.persist(session).await;
        drop(lock);
        match persisted {
            Ok(()) => {
                self.finish(TransactionState::RolledBack, true);
                info!(host = %self.host, "Rollback complete");
                Ok(())
            }
            Err(e) => {
                self.finish(TransactionState::RolledBack, false);
                Err(self.divergence(DivergentOperation::Rollback, e))
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn finish(&mut self, state: TransactionState, succeeded: bool) {
        debug!(host = %self.host, state = %state, succeeded, "Transaction finished");
        self.last_transition = Some(Transition {
            state,
            succeeded,
            at: Utc::now(),
        });
    }

    fn unsupported(&self, operation: &str, reason: String) -> Error {
        Error::UnsupportedOperation {
            host: self.host.clone(),
            operation: operation.to_string(),
            reason,
        }
    }

    fn divergence(&self, operation: DivergentOperation, cause: AdapterError) -> Error {
        let err = Error::Divergence {
            host: self.host.clone(),
            operation,
            message: cause.to_string(),
        };
        error!(host = %self.host, operation = %operation, error = %err, "Running and startup configuration have diverged");
        err
    }

    /// Failures while staging or applying a candidate.
    fn staging_error(&self, mode: StagingMode, operation: &str, err: AdapterError) -> Error {
        match err {
            AdapterError::Unsupported(reason) => self.unsupported(operation, reason),
            AdapterError::PartiallyApplied {
                command,
                output,
                applied,
                total,
            } => Error::PartialApply {
                host: self.host.clone(),
                applied,
                total,
                message: format!("'{}' rejected: {}", command, output),
            },
            other => match mode {
                StagingMode::Replace => Error::ReplaceConfig {
                    host: self.host.clone(),
                    message: other.to_string(),
                },
                StagingMode::Merge => Error::MergeConfig {
                    host: self.host.clone(),
                    message: other.to_string(),
                },
            },
        }
    }

    /// Failures in steps that never change running config.
    fn device_error(&self, operation: &str, err: AdapterError) -> Error {
        match err {
            AdapterError::Connection(e) => Error::Connection(e),
            AdapterError::CommandRejected { command, output }
            | AdapterError::PartiallyApplied {
                command, output, ..
            } => Error::Device {
                host: self.host.clone(),
                command,
                output,
            },
            AdapterError::Unsupported(reason) => self.unsupported(operation, reason),
            AdapterError::InvalidCandidate(message) => Error::Device {
                host: self.host.clone(),
                command: operation.to_string(),
                output: message,
            },
            AdapterError::Io(e) => Error::Io(e),
        }
    }
}

impl std::fmt::Debug for TransactionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStateMachine")
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("state", &self.state())
            .field("last_transition", &self.last_transition)
            .finish()
    }
}
