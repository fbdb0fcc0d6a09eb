//! Error types for netcfg.
//!
//! The variants mirror the failure kinds an operator has to react to
//! differently: a capability the transport lacks, a transaction already in
//! progress, a change that did not apply, and the dangerous case where a change
//! applied but could not be persisted.

use crate::connection::ConnectionError;
use thiserror::Error;

/// Result type alias for netcfg operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The step that left running and persisted configuration out of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergentOperation {
    /// A commit applied the candidate but the persist step failed.
    Commit,
    /// A rollback restored the rollback point but the persist step failed.
    Rollback,
}

impl std::fmt::Display for DivergentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivergentOperation::Commit => write!(f, "commit"),
            DivergentOperation::Rollback => write!(f, "rollback"),
        }
    }
}

/// The main error type for netcfg.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transaction Errors
    // ========================================================================
    /// The bound adapter or transport cannot perform the request.
    #[error("Unsupported operation '{operation}' on '{host}': {reason}")]
    UnsupportedOperation {
        /// Target device
        host: String,
        /// Operation that was requested
        operation: String,
        /// Why the adapter cannot do it
        reason: String,
    },

    /// A candidate is already staged for this device.
    #[error("Configuration session on '{host}' is locked by {holder}")]
    SessionLocked {
        /// Target device
        host: String,
        /// Who holds the lock
        holder: String,
    },

    /// Staging or applying a replace candidate failed; running config is unchanged.
    #[error("Replace config failed on '{host}': {message}")]
    ReplaceConfig {
        /// Target device
        host: String,
        /// Device or transport error text
        message: String,
    },

    /// Staging or applying a merge candidate failed; running config is unchanged.
    #[error("Merge config failed on '{host}': {message}")]
    MergeConfig {
        /// Target device
        host: String,
        /// Device or transport error text
        message: String,
    },

    /// The change is active but not persisted; a restart will silently revert it.
    #[error(
        "FATAL: {operation} on '{host}' changed the running configuration but could not persist it: {message}"
    )]
    Divergence {
        /// Target device
        host: String,
        /// Step that diverged
        operation: DivergentOperation,
        /// Persist step error text
        message: String,
    },

    /// A line-by-line apply was rejected after some lines had taken effect.
    ///
    /// Only adapters without an atomic apply can produce this; the running
    /// configuration holds the first `applied` lines and nothing was persisted.
    #[error("Partial apply on '{host}': {applied} of {total} commands took effect before: {message}")]
    PartialApply {
        /// Target device
        host: String,
        /// Commands accepted before the rejection
        applied: usize,
        /// Commands in the batch
        total: usize,
        /// Device error text
        message: String,
    },

    /// Restoring the rollback point failed before anything was persisted.
    #[error("Rollback failed on '{host}': {message}")]
    RollbackFailed {
        /// Target device
        host: String,
        /// Device or transport error text
        message: String,
    },

    /// Commit requested with no candidate staged.
    #[error("No candidate staged on '{host}'")]
    NothingStaged {
        /// Target device
        host: String,
    },

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// An operation needs an open session and there is none.
    #[error("Session to '{host}' is not open")]
    NotOpen {
        /// Target device
        host: String,
    },

    /// `open()` called twice.
    #[error("Session to '{host}' is already open")]
    AlreadyOpen {
        /// Target device
        host: String,
    },

    /// The device rejected a command outside of a load or commit step.
    #[error("Device '{host}' rejected '{command}': {output}")]
    Device {
        /// Target device
        host: String,
        /// Command that was rejected
        command: String,
        /// Device output
        output: String,
    },

    /// Transport failure, propagated as-is.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration or inventory.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Running and persisted configuration no longer match.
    ///
    /// Operator tooling should stop and escalate on this rather than retry.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Error::Divergence { .. })
    }

    /// The transport cannot do what was asked; retrying will not help.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOperation { .. })
    }

    /// Another transaction holds the device.
    pub fn is_locked(&self) -> bool {
        matches!(self, Error::SessionLocked { .. })
    }

    /// The device this error concerns, when known.
    pub fn host(&self) -> Option<&str> {
        match self {
            Error::UnsupportedOperation { host, .. }
            | Error::SessionLocked { host, .. }
            | Error::ReplaceConfig { host, .. }
            | Error::MergeConfig { host, .. }
            | Error::Divergence { host, .. }
            | Error::PartialApply { host, .. }
            | Error::RollbackFailed { host, .. }
            | Error::NothingStaged { host }
            | Error::NotOpen { host }
            | Error::AlreadyOpen { host }
            | Error::Device { host, .. } => Some(host),
            Error::Connection(_) | Error::Config(_) | Error::Io(_) => None,
        }
    }

    /// Short machine-readable kind used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedOperation { .. } => "unsupported_operation",
            Error::SessionLocked { .. } => "session_locked",
            Error::ReplaceConfig { .. } => "replace_config",
            Error::MergeConfig { .. } => "merge_config",
            Error::Divergence { .. } => "divergence",
            Error::PartialApply { .. } => "partial_apply",
            Error::RollbackFailed { .. } => "rollback_failed",
            Error::NothingStaged { .. } => "nothing_staged",
            Error::NotOpen { .. } => "not_open",
            Error::AlreadyOpen { .. } => "already_open",
            Error::Device { .. } => "device",
            Error::Connection(_) => "connection",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}
