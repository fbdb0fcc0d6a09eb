//! # netcfg - Configuration Transactions for Network Devices
//!
//! netcfg stages a candidate configuration on a network device, shows what
//! would change, and then commits or discards it, the same way whatever the
//! vendor. Devices that keep a rollback point can be restored to it.
//!
//! ## Core Concepts
//!
//! - **Sessions**: one authenticated channel to one device (SSH CLI or an
//!   HTTP command API)
//! - **Candidates**: a full replacement or a merge fragment, from a local
//!   file or inline text
//! - **Transactions**: load, compare, then commit or discard, serialized by
//!   a per-device lock
//! - **Adapters**: how one vendor family stages, diffs, applies and persists
//! - **Drivers**: the per-device facade tying the above together
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     CLI / Fleet runner (forks)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │  one per device
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Driver                                 │
//! │        open / load / compare / commit / discard / rollback          │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                         │                         │
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │   Transaction   │   │   Vendor adapter    │   │      Session        │
//! │  state machine  │──▶│  (ios, nxos, eos,   │──▶│   (SSH CLI or       │
//! │   + lock        │   │   direct)           │   │    command API)     │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use netcfg::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut driver = Driver::builder("r1")
//!         .platform(NetworkPlatform::CiscoIos)
//!         .session(session)
//!         .build()?;
//!
//!     driver.open().await?;
//!     driver
//!         .load_replace_candidate(CandidateSource::file("configs/r1.cfg"))
//!         .await?;
//!     println!("{}", driver.compare_config().await?);
//!     driver.commit_config().await?;
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! ```rust,ignore
    //! use netcfg::prelude::*;
    //! ```

    // Sessions
    #[cfg(feature = "eapi")]
    pub use crate::connection::{EapiSession, EapiSessionBuilder};
    #[cfg(feature = "russh")]
    pub use crate::connection::{SshSession, SshSessionBuilder};
    pub use crate::connection::{
        CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions,
        TransferOptions,
    };

    // Error handling
    pub use crate::error::{DivergentOperation, Error, Result};

    // Transactions
    pub use crate::transaction::{
        CandidateConfig, CandidateSource, CandidateTarget, ConfigDiff, DeviceLocks, DiffFidelity,
        RollbackPoint, StagingMode, TransactionState,
    };

    // Vendor adapters
    pub use crate::vendor::{
        adapter_for, AdapterSettings, Capabilities, NetworkPlatform, NetworkTransport,
        VendorAdapter,
    };

    // Facade and fleet
    pub use crate::driver::{Connector, Driver, DriverBuilder};
    pub use crate::fleet::{Candidates, DeviceOutcome, DeviceReport, FleetOperation, FleetRunner};

    // Configuration
    pub use crate::config::{Config, DeviceSettings};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// [`Error`](error::Error) distinguishes failures that left the device
/// unchanged from the one that did not: a
/// [`Divergence`](error::Error::Divergence) means running config changed and
/// could not be persisted.
pub mod error;

/// Sessions to devices.
pub mod connection;

/// Candidates, diffs, locks and the transaction state machine.
pub mod transaction;

/// Vendor adapters and platform selection.
pub mod vendor;

// ============================================================================
// Facade
// ============================================================================

/// The per-device [`Driver`](driver::Driver).
pub mod driver;

/// Running one operation across many devices.
pub mod fleet;

// ============================================================================
// Ambient
// ============================================================================

/// Configuration files, inventory and environment overrides.
pub mod config;

/// Tracing subscriber setup.
pub mod logging;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
