//! The per-device facade.
//!
//! A [`Driver`] binds one session, one vendor adapter and one transaction
//! state machine to a device. Callers open it, stage a candidate, look at
//! the diff, and commit or discard:
//!
//! ```rust,ignore
//! use netcfg::prelude::*;
//!
//! let mut driver = Driver::from_settings(&settings, DeviceLocks::new());
//! driver.open().await?;
//! driver.load_replace_candidate(CandidateSource::file("r1.cfg")).await?;
//! let diff = driver.compare_config().await?;
//! if diff.is_empty() {
//!     driver.discard_config().await?;
//! } else {
//!     driver.commit_config().await?;
//! }
//! driver.close().await?;
//! ```

use crate::config::DeviceSettings;
use crate::connection::{Connection, ConnectionResult};
use crate::error::{Error, Result};
use crate::transaction::{
    CandidateConfig, CandidateSource, ConfigDiff, DeviceLocks, RollbackPoint, StagingMode,
    TransactionState, TransactionStateMachine, Transition,
};
use crate::vendor::{
    adapter_for, AdapterSettings, Capabilities, NetworkPlatform, NetworkTransport, VendorAdapter,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Connectors
// ============================================================================

/// Something that can open a session to a device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session
    async fn connect(&self) -> ConnectionResult<Arc<dyn Connection>>;
}

/// An already established session; every open hands out the same one.
#[async_trait]
impl Connector for Arc<dyn Connection> {
    async fn connect(&self) -> ConnectionResult<Arc<dyn Connection>> {
        Ok(Arc::clone(self))
    }
}

/// Opens the transport named in the device's settings.
#[async_trait]
impl Connector for DeviceSettings {
    async fn connect(&self) -> ConnectionResult<Arc<dyn Connection>> {
        match self.transport {
            NetworkTransport::Ssh => connect_ssh(self).await,
            NetworkTransport::Eapi => connect_eapi(self).await,
        }
    }
}

#[cfg(feature = "russh")]
async fn connect_ssh(settings: &DeviceSettings) -> ConnectionResult<Arc<dyn Connection>> {
    use crate::connection::SshSessionBuilder;

    let mut builder = SshSessionBuilder::new(&settings.host).use_keys(settings.use_keys);
    if let Some(port) = settings.port {
        builder = builder.port(port);
    }
    if let Some(username) = &settings.username {
        builder = builder.username(username);
    }
    if let Some(password) = &settings.password {
        builder = builder.password(password);
    }
    if let Some(secret) = &settings.secret {
        builder = builder.secret(secret);
    }
    if let Some(key_file) = &settings.key_file {
        builder = builder.key_file(key_file);
    }
    if let Some(timeout) = settings.adapter.timeout {
        builder = builder.timeout(timeout);
    }
    Ok(Arc::new(builder.connect().await?))
}

#[cfg(not(feature = "russh"))]
async fn connect_ssh(_settings: &DeviceSettings) -> ConnectionResult<Arc<dyn Connection>> {
    Err(crate::connection::ConnectionError::UnsupportedOperation(
        "SSH sessions need the 'russh' feature".to_string(),
    ))
}

#[cfg(feature = "eapi")]
async fn connect_eapi(settings: &DeviceSettings) -> ConnectionResult<Arc<dyn Connection>> {
    use crate::connection::EapiSessionBuilder;

    let mut builder = EapiSessionBuilder::new(&settings.host)
        .use_ssl(settings.eapi_use_ssl)
        .validate_certs(settings.eapi_validate_certs);
    if let Some(port) = settings.port {
        builder = builder.port(port);
    }
    if let Some(username) = &settings.username {
        builder = builder.username(username);
    }
    if let Some(password) = &settings.password {
        builder = builder.password(password);
    }
    if let Some(timeout) = settings.adapter.timeout {
        builder = builder.timeout(timeout);
    }
    Ok(Arc::new(builder.connect().await?))
}

#[cfg(not(feature = "eapi"))]
async fn connect_eapi(_settings: &DeviceSettings) -> ConnectionResult<Arc<dyn Connection>> {
    Err(crate::connection::ConnectionError::UnsupportedOperation(
        "command API sessions need the 'eapi' feature".to_string(),
    ))
}

// ============================================================================
// Driver
// ============================================================================

/// Configuration transactions against one device.
pub struct Driver {
    host: String,
    connector: Box<dyn Connector>,
    adapter: Box<dyn VendorAdapter>,
    machine: TransactionStateMachine,
    session: Option<Arc<dyn Connection>>,
}

impl Driver {
    /// Start building a driver for `host`
    pub fn builder(host: impl Into<String>) -> DriverBuilder {
        DriverBuilder::new(host)
    }

    /// Driver for a resolved inventory entry.
    ///
    /// The device lock is keyed by the entry's address, so aliases of one
    /// device exclude each other.
    pub fn from_settings(settings: &DeviceSettings, locks: DeviceLocks) -> Self {
        let adapter = adapter_for(settings.platform, settings.adapter.clone());
        Self {
            host: settings.name.clone(),
            connector: Box::new(settings.clone()),
            adapter,
            machine: TransactionStateMachine::new(settings.name.clone(), locks)
                .with_lock_key(settings.address()),
            session: None,
        }
    }

    /// Device name
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Adapter name
    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// What the bound adapter supports
    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    /// Where the adapter keeps its rollback point, if it keeps one
    pub fn rollback_point(&self) -> Option<RollbackPoint> {
        self.adapter.rollback_point()
    }

    /// Transaction state
    pub fn state(&self) -> TransactionState {
        self.machine.state()
    }

    /// The staged candidate, if any
    pub fn candidate(&self) -> Option<&CandidateConfig> {
        self.machine.candidate()
    }

    /// The most recent commit, discard or rollback
    pub fn last_transition(&self) -> Option<&Transition> {
        self.machine.last_transition()
    }

    /// Whether `open` has succeeded and `close` has not been called since
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the session is open and answering
    pub async fn is_alive(&self) -> bool {
        match &self.session {
            Some(session) => session.is_alive().await,
            None => false,
        }
    }

    fn session(&self) -> Result<Arc<dyn Connection>> {
        self.session.clone().ok_or_else(|| Error::NotOpen {
            host: self.host.clone(),
        })
    }

    /// Establish the session.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen {
                host: self.host.clone(),
            });
        }
        let session = self.connector.connect().await?;
        info!(adapter = self.adapter.name(), "Session open");
        self.session = Some(session);
        Ok(())
    }

    /// Close the session, discarding any staged candidate first.
    ///
    /// Closing a driver that is not open does nothing.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if self.machine.is_staged() {
            if session.is_alive().await {
                if let Err(e) = self
                    .machine
                    .discard(self.adapter.as_ref(), session.as_ref())
                    .await
                {
                    warn!(error = %e, "Could not discard staged candidate while closing");
                }
            } else {
                self.machine.abort();
            }
        }

        session.close().await?;
        debug!("Session closed");
        Ok(())
    }

    /// Stage a candidate that replaces the running configuration.
    #[instrument(skip(self, source), fields(host = %self.host, source = %source))]
    pub async fn load_replace_candidate(&mut self, source: CandidateSource) -> Result<()> {
        self.load(StagingMode::Replace, source).await
    }

    /// Stage a candidate merged into the running configuration.
    #[instrument(skip(self, source), fields(host = %self.host, source = %source))]
    pub async fn load_merge_candidate(&mut self, source: CandidateSource) -> Result<()> {
        self.load(StagingMode::Merge, source).await
    }

    async fn load(&mut self, mode: StagingMode, source: CandidateSource) -> Result<()> {
        let session = self.session()?;
        self.machine
            .load(self.adapter.as_ref(), session.as_ref(), mode, source)
            .await
    }

    /// Diff the staged candidate against running config; empty when
    /// nothing is staged.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn compare_config(&self) -> Result<ConfigDiff> {
        let session = self.session()?;
        self.machine
            .compare(self.adapter.as_ref(), session.as_ref())
            .await
    }

    /// Apply and persist the staged candidate.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn commit_config(&mut self) -> Result<()> {
        let session = self.session()?;
        self.machine
            .commit(self.adapter.as_ref(), session.as_ref())
            .await
    }

    /// Abandon the staged candidate.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn discard_config(&mut self) -> Result<()> {
        let session = self.session()?;
        self.machine
            .discard(self.adapter.as_ref(), session.as_ref())
            .await
    }

    /// Restore and persist the rollback point.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn rollback(&mut self) -> Result<()> {
        let session = self.session()?;
        self.machine
            .rollback(self.adapter.as_ref(), session.as_ref())
            .await
    }

    /// Open the driver, run `work`, and close it again whatever `work`
    /// returned.
    ///
    /// ```rust,ignore
    /// let diff = driver
    ///     .scoped(|d| Box::pin(async move {
    ///         d.load_merge_candidate(CandidateSource::text("ntp server 192.0.2.1")).await?;
    ///         d.compare_config().await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn scoped<T, F>(&mut self, work: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Driver) -> BoxFuture<'a, Result<T>>,
    {
        self.open().await?;
        let result = work(self).await;
        let closed = self.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("host", &self.host)
            .field("adapter", &self.adapter.name())
            .field("open", &self.is_open())
            .field("machine", &self.machine)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Driver`]
pub struct DriverBuilder {
    host: String,
    platform: NetworkPlatform,
    settings: AdapterSettings,
    adapter: Option<Box<dyn VendorAdapter>>,
    connector: Option<Box<dyn Connector>>,
    locks: Option<DeviceLocks>,
}

impl DriverBuilder {
    /// Start building a driver for `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            platform: NetworkPlatform::default(),
            settings: AdapterSettings::default(),
            adapter: None,
            connector: None,
            locks: None,
        }
    }

    /// Device platform, used to pick the adapter
    pub fn platform(mut self, platform: NetworkPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Adapter settings
    pub fn settings(mut self, settings: AdapterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this adapter instead of the platform's
    pub fn adapter(mut self, adapter: Box<dyn VendorAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Use an already established session
    pub fn session(mut self, session: Arc<dyn Connection>) -> Self {
        self.connector = Some(Box::new(session));
        self
    }

    /// Open sessions through `connector`
    pub fn connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share a lock registry with other drivers
    pub fn locks(mut self, locks: DeviceLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Build the driver
    pub fn build(self) -> Result<Driver> {
        let connector = self.connector.ok_or_else(|| {
            Error::Config(format!("Driver for '{}' has no session or connector", self.host))
        })?;
        let adapter = self
            .adapter
            .unwrap_or_else(|| adapter_for(self.platform, self.settings));
        let locks = self.locks.unwrap_or_default();
        Ok(Driver {
            machine: TransactionStateMachine::new(self.host.clone(), locks),
            host: self.host,
            connector,
            adapter,
            session: None,
        })
    }
}
