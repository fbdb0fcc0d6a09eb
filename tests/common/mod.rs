//! Shared test utilities for the netcfg test suite.
//!
//! This module provides:
//! - A scriptable [`MockConnection`] standing in for a device session
//! - Fake device behaviors (checksums, canned diffs) for IOS, NX-OS and EOS
//! - Driver construction helpers
//! - Temporary directory management for local candidate files
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tempfile::TempDir;

use netcfg::connection::{
    CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions,
    TransferOptions,
};
use netcfg::driver::{Connector, Driver};
use netcfg::transaction::DeviceLocks;
use netcfg::vendor::{AdapterSettings, NetworkPlatform};

// ============================================================================
// Mock Connection Implementation
// ============================================================================

/// A mock device session.
///
/// Tracks every command and upload, answers commands from canned results
/// (exact match first, then longest prefix), and can be told to fail
/// specific commands or every operation.
///
/// # Example
///
/// ```rust,ignore
/// let mock = MockConnection::new("r1");
/// mock.set_command_result("show clock", CommandResult::success("12:00".into(), "".into()));
///
/// let result = mock.execute("show clock", None).await.unwrap();
/// assert!(result.success);
/// assert_eq!(mock.command_count(), 1);
/// ```
#[derive(Debug)]
pub struct MockConnection {
    identifier: String,
    alive: AtomicBool,
    commands_executed: RwLock<Vec<String>>,
    files_uploaded: RwLock<Vec<(Option<PathBuf>, String)>>,
    command_results: RwLock<HashMap<String, CommandResult>>,
    prefix_results: RwLock<Vec<(String, CommandResult)>>,
    default_result: RwLock<CommandResult>,
    broken_commands: RwLock<HashSet<String>>,
    should_fail: AtomicBool,
    uploads_unsupported: AtomicBool,
    command_count: AtomicU32,
    virtual_filesystem: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockConnection {
    /// Create a new mock session with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            alive: AtomicBool::new(true),
            commands_executed: RwLock::new(Vec::new()),
            files_uploaded: RwLock::new(Vec::new()),
            command_results: RwLock::new(HashMap::new()),
            prefix_results: RwLock::new(Vec::new()),
            default_result: RwLock::new(CommandResult::success(String::new(), String::new())),
            broken_commands: RwLock::new(HashSet::new()),
            should_fail: AtomicBool::new(false),
            uploads_unsupported: AtomicBool::new(false),
            command_count: AtomicU32::new(0),
            virtual_filesystem: RwLock::new(HashMap::new()),
        }
    }

    /// Set the result for a specific command.
    pub fn set_command_result(&self, command: impl Into<String>, result: CommandResult) {
        self.command_results.write().insert(command.into(), result);
    }

    /// Set the output of a specific command.
    pub fn set_output(&self, command: impl Into<String>, output: impl Into<String>) {
        self.set_command_result(command, ok(output));
    }

    /// Answer every command starting with `prefix`.
    pub fn set_prefix_result(&self, prefix: impl Into<String>, result: CommandResult) {
        self.prefix_results.write().push((prefix.into(), result));
    }

    /// Set the default result for commands not explicitly configured.
    pub fn set_default_result(&self, result: CommandResult) {
        *self.default_result.write() = result;
    }

    /// Make `command` fail at the transport level.
    pub fn break_command(&self, command: impl Into<String>) {
        self.broken_commands.write().insert(command.into());
    }

    /// Configure the mock to fail all operations.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Refuse file transfer the way a command API does.
    pub fn set_uploads_unsupported(&self, unsupported: bool) {
        self.uploads_unsupported.store(unsupported, Ordering::SeqCst);
    }

    /// Get the number of commands executed.
    pub fn command_count(&self) -> u32 {
        self.command_count.load(Ordering::SeqCst)
    }

    /// Get all commands that were executed.
    pub fn get_commands(&self) -> Vec<String> {
        self.commands_executed.read().clone()
    }

    /// Whether `command` was executed.
    pub fn ran(&self, command: &str) -> bool {
        self.commands_executed.read().iter().any(|c| c == command)
    }

    /// Uploads as (local path for file uploads, remote location) pairs.
    pub fn get_uploaded_files(&self) -> Vec<(Option<PathBuf>, String)> {
        self.files_uploaded.read().clone()
    }

    /// Content of a file on the fake device storage.
    pub fn virtual_file(&self, remote: &str) -> Option<String> {
        self.virtual_filesystem
            .read()
            .get(remote)
            .map(|content| String::from_utf8_lossy(content).into_owned())
    }

    /// Put a file on the fake device storage.
    pub fn add_virtual_file(&self, remote: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.virtual_filesystem
            .write()
            .insert(remote.into(), content.into());
    }

    /// Kill the mock session (mark as not alive).
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Forget recorded commands and uploads.
    pub fn reset(&self) {
        self.commands_executed.write().clear();
        self.files_uploaded.write().clear();
        self.command_count.store(0, Ordering::SeqCst);
        self.should_fail.store(false, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Checksum answers computed from the fake storage.
    fn checksum_result(&self, command: &str) -> Option<CommandResult> {
        if let Some(path) = command.strip_prefix("verify /md5 ") {
            let md5 = self.md5_of(path)?;
            return Some(ok(format!("....\nverify /md5 ({}) = {}", path, md5)));
        }
        let path = command.strip_prefix("show file ")?.strip_suffix(" md5sum")?;
        self.md5_of(path).map(ok)
    }

    fn md5_of(&self, remote: &str) -> Option<String> {
        self.virtual_filesystem
            .read()
            .get(remote)
            .map(|content| format!("{:x}", md5::compute(content)))
    }

    fn store_upload(&self, local: Option<PathBuf>, remote: &str, content: Vec<u8>) {
        self.files_uploaded
            .write()
            .push((local, remote.to_string()));
        self.virtual_filesystem
            .write()
            .insert(remote.to_string(), content);
    }

    fn upload_allowed(&self) -> ConnectionResult<()> {
        if self.uploads_unsupported.load(Ordering::SeqCst) {
            return Err(ConnectionError::UnsupportedOperation(
                "file transfer is not available over the command API".to_string(),
            ));
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ConnectionError::TransferFailed(
                "Mock upload failed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn execute(
        &self,
        command: &str,
        _options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        if self.should_fail.load(Ordering::SeqCst) || !self.alive.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionFailed(
                "Mock connection failed".to_string(),
            ));
        }

        self.command_count.fetch_add(1, Ordering::SeqCst);
        self.commands_executed.write().push(command.to_string());

        if self.broken_commands.read().contains(command) {
            return Err(ConnectionError::ExecutionFailed(format!(
                "channel closed while running '{}'",
                command
            )));
        }

        // Check for specific command result
        if let Some(result) = self.command_results.read().get(command) {
            return Ok(result.clone());
        }

        let prefixed = self
            .prefix_results
            .read()
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, result)| result.clone());
        if let Some(result) = prefixed {
            return Ok(result);
        }

        if let Some(result) = self.checksum_result(command) {
            return Ok(result);
        }

        // Return default result
        Ok(self.default_result.read().clone())
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote: &str,
        _options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        self.upload_allowed()?;
        let content = std::fs::read(local_path)?;
        self.store_upload(Some(local_path.to_path_buf()), remote, content);
        Ok(())
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote: &str,
        _options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        self.upload_allowed()?;
        self.store_upload(None, remote, content.to_vec());
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A connector handing out one mock session, revived on every open.
pub struct MockConnector(pub Arc<MockConnection>);

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> ConnectionResult<Arc<dyn Connection>> {
        self.0.alive.store(true, Ordering::SeqCst);
        Ok(self.0.clone())
    }
}

/// A connector for a device that never answers.
pub struct UnreachableConnector;

#[async_trait]
impl Connector for UnreachableConnector {
    async fn connect(&self) -> ConnectionResult<Arc<dyn Connection>> {
        Err(ConnectionError::ConnectionFailed(
            "No route to host".to_string(),
        ))
    }
}

// ============================================================================
// Command Results
// ============================================================================

/// Successful result with `output`.
pub fn ok(output: impl Into<String>) -> CommandResult {
    CommandResult::success(output.into(), String::new())
}

/// Result whose output carries a device error line.
pub fn rejected(output: impl Into<String>) -> CommandResult {
    CommandResult::success(output.into(), String::new())
}

/// Result the transport itself flags as failed (command API style).
pub fn failed(message: impl Into<String>) -> CommandResult {
    CommandResult::failure(1002, String::new(), message.into())
}

// ============================================================================
// Fake Devices
// ============================================================================

pub const IOS_CANDIDATE: &str = "flash:candidate_config.txt";
pub const IOS_ROLLBACK: &str = "flash:rollback_config.txt";
pub const IOS_DIFF: &str =
    "show archive config differences flash:candidate_config.txt system:running-config";

pub const SAMPLE_CANDIDATE: &str = "hostname r1\n!\ninterface Loopback0\n ip address 192.0.2.1 255.255.255.255\n!\nend\n";

/// An IOS device whose running config differs from the candidate.
pub fn fake_ios(host: &str) -> Arc<MockConnection> {
    let mock = Arc::new(MockConnection::new(host));
    mock.set_output(
        IOS_DIFF,
        "!Contextual Config Diffs:\n+interface Loopback0\n+ ip address 192.0.2.1 255.255.255.255\n",
    );
    mock
}

/// An IOS device already running the candidate.
pub fn fake_ios_in_sync(host: &str) -> Arc<MockConnection> {
    let mock = Arc::new(MockConnection::new(host));
    mock.set_output(IOS_DIFF, "!No changes were found\n");
    mock
}

/// An EOS device answering session diffs.
pub fn fake_eos(host: &str) -> Arc<MockConnection> {
    let mock = Arc::new(MockConnection::new(host));
    mock.set_prefix_result(
        "show session-config named ",
        ok("--- system:/running-config\n+++ session:/netcfg-session-config\n@@ -1,3 +1,4 @@\n+ntp server 192.0.2.123\n"),
    );
    mock
}

/// A device on the generic platform with a small running config.
pub fn fake_generic(host: &str) -> Arc<MockConnection> {
    let mock = Arc::new(MockConnection::new(host));
    mock.set_output(
        "show running-config",
        "Building configuration...\n\nCurrent configuration : 120 bytes\n!\nhostname r1\n!\nntp server 192.0.2.10\n!\nend\n",
    );
    mock
}

// ============================================================================
// Drivers
// ============================================================================

/// A driver for `platform` bound to `session`.
pub fn driver_for(
    platform: NetworkPlatform,
    session: &Arc<MockConnection>,
    locks: &DeviceLocks,
) -> Driver {
    Driver::builder(session.identifier().to_string())
        .platform(platform)
        .settings(AdapterSettings::default())
        .connector(Box::new(MockConnector(Arc::clone(session))))
        .locks(locks.clone())
        .build()
        .expect("driver should build")
}

/// An opened driver for `platform` bound to `session`.
pub async fn open_driver(
    platform: NetworkPlatform,
    session: &Arc<MockConnection>,
    locks: &DeviceLocks,
) -> Driver {
    let mut driver = driver_for(platform, session, locks);
    driver.open().await.expect("open should succeed");
    driver
}

// ============================================================================
// Temporary Directory Management
// ============================================================================

/// A test context that provides a temporary directory.
pub struct TestContext {
    /// The temporary directory for this test.
    pub temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a temporary directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file in the temporary directory.
    pub fn create_file(&self, relative_path: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.temp_dir.path().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new().expect("Failed to create test context")
    }
}
