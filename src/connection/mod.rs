//! Session layer for network device communication.
//!
//! A [`Connection`] is one live, authenticated channel to one device. The
//! transaction layer only ever needs two things from it: run a command and get
//! its text back, and put a file onto the device. Everything else (how the
//! channel was authenticated, how prompts are detected, whether commands travel
//! over an SSH shell or a JSON-RPC request) stays behind this trait.
//!
//! # Supported Transports
//!
//! - **SSH CLI** (via `russh`, feature `russh`): interactive shell with prompt
//!   detection, SCP/SFTP uploads
//! - **Command API** (via `reqwest`, feature `eapi`): JSON-RPC `runCmds` over
//!   HTTP(S); batches run in a single request
//!
//! # Example
//!
//! ```rust,ignore
//! use netcfg::connection::{Connection, ExecuteOptions};
//! use netcfg::connection::ssh::SshSessionBuilder;
//!
//! let session = SshSessionBuilder::new("192.0.2.10")
//!     .username("admin")
//!     .password("secret")
//!     .connect()
//!     .await?;
//!
//! let result = session
//!     .execute("show version", Some(ExecuteOptions::new().with_timeout(30)))
//!     .await?;
//! println!("{}", result.stdout);
//! ```

/// Interactive SSH CLI sessions built on russh.
#[cfg(feature = "russh")]
pub mod ssh;

/// HTTP JSON-RPC command API sessions.
#[cfg(feature = "eapi")]
pub mod eapi;

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "eapi")]
pub use eapi::{EapiSession, EapiSessionBuilder};
#[cfg(feature = "russh")]
pub use ssh::{SshSession, SshSessionBuilder, TransferMethod};

#[cfg(feature = "russh")]
impl From<::russh::Error> for ConnectionError {
    fn from(err: ::russh::Error) -> Self {
        ConnectionError::SshError(format!("Russh error: {}", err))
    }
}

#[cfg(feature = "russh")]
impl From<russh_sftp::client::error::Error> for ConnectionError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        ConnectionError::TransferFailed(format!("SFTP error: {}", e))
    }
}

/// Errors that can occur during session operations.
///
/// These are transport failures: the device could not be reached, did not
/// answer in time, or the channel broke. A device that answers with an error
/// message is not a transport failure and is reported through
/// [`CommandResult`] instead.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish initial connection to the device.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the device.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed (not to be confused with a device error message).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// File upload operation failed.
    #[error("File transfer failed: {0}")]
    TransferFailed(String),

    /// A single round-trip exceeded its deadline.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SSH-specific error from the underlying implementation.
    #[error("SSH error: {0}")]
    SshError(String),

    /// HTTP-specific error from the command API client.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// I/O error during session operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Session was closed, or was never opened.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The requested operation is not supported by this transport.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Result type for session operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of executing a command on a session.
///
/// Interactive CLIs have no exit codes, so a CLI session reports every
/// command that produced output as a success and leaves it to the vendor
/// adapter to recognise error text. Transports with structured errors (the
/// command API) report rejected commands as failures.
///
/// # Example
///
/// ```rust
/// use netcfg::connection::CommandResult;
///
/// let result = CommandResult::success("Building configuration...".into(), String::new());
/// assert!(result.success);
///
/// let failed = CommandResult::failure(1002, String::new(), "Invalid input".into());
/// assert!(!failed.success);
/// ```
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Transport status code (0 indicates success).
    pub exit_code: i32,
    /// Text returned by the device.
    pub stdout: String,
    /// Error text returned by the transport, if it separates it.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }

    /// Get the combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Options for command execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Timeout in seconds for this round-trip (None for the session default)
    pub timeout: Option<u64>,
    /// Pattern that ends the command output instead of the device prompt.
    ///
    /// Used for commands that stop at an interactive question such as
    /// `Destination filename [candidate_config.txt]?`.
    pub expect: Option<String>,
}

impl ExecuteOptions {
    /// Create new execute options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for `pattern` instead of the prompt
    pub fn with_expect(mut self, pattern: impl Into<String>) -> Self {
        self.expect = Some(pattern.into());
        self
    }
}

/// Options for file transfer
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// File mode (permissions) to announce to the device
    pub mode: Option<u32>,
    /// Timeout in seconds for the whole transfer
    pub timeout: Option<u64>,
}

impl TransferOptions {
    /// Create new transfer options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set file mode
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the transfer timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The capability every device transport implements.
///
/// Remote locations are device file-system specifiers such as
/// `flash:candidate_config.txt`, not POSIX paths.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the session identifier (normally the device hostname)
    fn identifier(&self) -> &str;

    /// Check if the session is still alive
    async fn is_alive(&self) -> bool;

    /// Execute a command on the device
    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult>;

    /// Upload a local file to the device
    async fn upload(
        &self,
        local_path: &Path,
        remote: &str,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()>;

    /// Upload content directly to a file on the device
    async fn upload_content(
        &self,
        content: &[u8],
        remote: &str,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()>;

    /// Close the session
    async fn close(&self) -> ConnectionResult<()>;

    /// Whether [`execute_batch`](Self::execute_batch) sends the whole batch
    /// in one exchange that the device stops at its first rejected command.
    ///
    /// CLI sessions answer `false`: the default batch only stops on an
    /// unsuccessful result, and a CLI reports refusals as output text, so
    /// callers that must stop at a refusal send commands one at a time.
    fn sends_batch_as_one(&self) -> bool {
        false
    }

    /// Execute multiple commands in order (default: sequential)
    ///
    /// Results are returned in input order. Execution stops at the first
    /// transport error or the first unsuccessful result, so the returned
    /// vector may be shorter than `commands`. Transports that can send a
    /// whole batch in one exchange (the command API) override this, which
    /// matters for commands that only make sense together such as entering
    /// a configuration session and pushing lines into it.
    async fn execute_batch(
        &self,
        commands: &[String],
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<Vec<CommandResult>> {
        let mut results = Vec::with_capacity(commands.len());
        for cmd in commands {
            let result = self.execute(cmd, options.clone()).await?;
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }
        Ok(results)
    }
}

/// Bound one transport round-trip by `timeout_secs`.
///
/// `None` runs the future unbounded.
pub async fn with_timeout<T, F>(timeout_secs: Option<u64>, future: F) -> ConnectionResult<T>
where
    F: Future<Output = ConnectionResult<T>>,
{
    match timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), future).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(secs)),
        },
        None => future.await,
    }
}
