//! Configuration transactions.
//!
//! A transaction stages a candidate configuration, lets the caller inspect
//! the diff, and then either commits it (apply + persist) or discards it.
//! Rollback restores the device's last rollback point outside of any staged
//! transaction.
//!
//! - [`types`]: candidates, diffs, states
//! - [`lock`]: per-device exclusive locks
//! - [`machine`]: the state machine tying adapter steps together

pub mod lock;
pub mod machine;
pub mod types;

pub use lock::{DeviceLock, DeviceLocks};
pub use machine::TransactionStateMachine;
pub use types::{
    CandidateConfig, CandidateSource, CandidateTarget, ConfigDiff, DiffFidelity, RollbackPoint,
    SourceKind, StagingMode, TransactionState, Transition,
};
