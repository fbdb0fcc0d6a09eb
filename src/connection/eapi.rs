//! HTTP JSON-RPC command API session.
//!
//! Devices that expose a command API (Arista eAPI being the common case)
//! accept a JSON-RPC `runCmds` request carrying a list of CLI commands and
//! answer with one result per command. The API is stateless between requests,
//! so commands that depend on each other (entering a configuration session
//! and pushing lines into it) must travel in the same request; this session
//! overrides [`Connection::execute_batch`] to do exactly that.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::{
    CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions,
    TransferOptions,
};

/// Default command API HTTPS port
const EAPI_DEFAULT_HTTPS_PORT: u16 = 443;

/// Default command API HTTP port
const EAPI_DEFAULT_HTTP_PORT: u16 = 80;

/// Default timeout for command API requests (seconds)
const EAPI_DEFAULT_TIMEOUT: u64 = 60;

/// JSON-RPC error code the API uses when a command in the batch failed.
const EAPI_COMMAND_ERROR: i32 = 1002;

// ============================================================================
// Wire Types
// ============================================================================

/// JSON-RPC request format
#[derive(Debug, Serialize)]
struct EapiRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: EapiParams<'a>,
    id: String,
}

#[derive(Debug, Serialize)]
struct EapiParams<'a> {
    version: u32,
    cmds: &'a [String],
    format: &'static str,
}

/// JSON-RPC response format
#[derive(Debug, Deserialize)]
struct EapiResponse {
    #[serde(default)]
    result: Option<Vec<EapiResult>>,
    #[serde(default)]
    error: Option<EapiError>,
}

#[derive(Debug, Deserialize)]
struct EapiResult {
    #[serde(default)]
    output: String,
}

#[derive(Debug, Deserialize)]
struct EapiError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<Vec<EapiErrorData>>,
}

#[derive(Debug, Deserialize)]
struct EapiErrorData {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

// ============================================================================
// Session
// ============================================================================

/// A command API session to one device.
pub struct EapiSession {
    host: String,
    url: String,
    username: String,
    password: String,
    client: Client,
    timeout: u64,
    open: AtomicBool,
}

impl std::fmt::Debug for EapiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapiSession")
            .field("host", &self.host)
            .field("url", &self.url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl EapiSession {
    /// Run `commands` in one request and map the answer to per-command results.
    async fn run_cmds(
        &self,
        commands: &[String],
        timeout: Option<u64>,
    ) -> ConnectionResult<Vec<CommandResult>> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }

        let request = EapiRequest {
            jsonrpc: "2.0",
            method: "runCmds",
            params: EapiParams {
                version: 1,
                cmds: commands,
                format: "text",
            },
            id: uuid::Uuid::new_v4().to_string(),
        };

        trace!(host = %self.host, count = commands.len(), "Sending runCmds request");

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(Duration::from_secs(timeout.unwrap_or(self.timeout)))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConnectionError::Timeout(timeout.unwrap_or(self.timeout))
                } else {
                    ConnectionError::HttpError(format!("Command API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "Command API rejected credentials for {}",
                self.username
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectionError::HttpError(format!(
                "Command API returned error status {}: {}",
                status, body
            )));
        }

        let eapi_response: EapiResponse = response.json().await.map_err(|e| {
            ConnectionError::HttpError(format!("Failed to parse command API response: {}", e))
        })?;

        if let Some(error) = eapi_response.error {
            return Self::map_error(commands, error);
        }

        let results = eapi_response.result.ok_or_else(|| {
            ConnectionError::ExecutionFailed("Command API returned no result".to_string())
        })?;

        Ok(results
            .into_iter()
            .map(|r| CommandResult::success(r.output, String::new()))
            .collect())
    }

    /// A command error carries one data entry per command that ran; the last
    /// one holds the rejection text.
    fn map_error(
        commands: &[String],
        error: EapiError,
    ) -> ConnectionResult<Vec<CommandResult>> {
        if error.code != EAPI_COMMAND_ERROR {
            return Err(ConnectionError::ExecutionFailed(format!(
                "Command API error {}: {}",
                error.code, error.message
            )));
        }

        let data = error.data.unwrap_or_default();
        let mut results = Vec::with_capacity(data.len());
        let last = data.len().saturating_sub(1);
        for (i, entry) in data.into_iter().enumerate().take(commands.len()) {
            let output = entry.output.unwrap_or_default();
            if i == last || !entry.errors.is_empty() {
                let mut message = entry.errors.join(", ");
                if message.is_empty() {
                    message = error.message.clone();
                }
                results.push(CommandResult::failure(error.code, output, message));
                break;
            }
            results.push(CommandResult::success(output, String::new()));
        }

        if results.is_empty() {
            results.push(CommandResult::failure(
                error.code,
                String::new(),
                error.message,
            ));
        }
        Ok(results)
    }
}

#[async_trait]
impl Connection for EapiSession {
    fn identifier(&self) -> &str {
        &self.host
    }

    async fn is_alive(&self) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        self.run_cmds(&["show clock".to_string()], Some(5))
            .await
            .map(|r| r.iter().all(|c| c.success))
            .unwrap_or(false)
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let timeout = options.and_then(|o| o.timeout);
        let mut results = self.run_cmds(&[command.to_string()], timeout).await?;
        results.pop().ok_or_else(|| {
            ConnectionError::ExecutionFailed(format!("No output from command API for '{}'", command))
        })
    }

    fn sends_batch_as_one(&self) -> bool {
        true
    }

    async fn execute_batch(
        &self,
        commands: &[String],
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<Vec<CommandResult>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let timeout = options.and_then(|o| o.timeout);
        self.run_cmds(commands, timeout).await
    }

    async fn upload(
        &self,
        _local_path: &Path,
        _remote: &str,
        _options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        Err(ConnectionError::UnsupportedOperation(
            "file transfer is not available over the command API".to_string(),
        ))
    }

    async fn upload_content(
        &self,
        _content: &[u8],
        _remote: &str,
        _options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        Err(ConnectionError::UnsupportedOperation(
            "file transfer is not available over the command API".to_string(),
        ))
    }

    async fn close(&self) -> ConnectionResult<()> {
        self.open.store(false, Ordering::SeqCst);
        debug!(host = %self.host, "Command API session closed");
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EapiSession`]
#[derive(Debug, Clone)]
pub struct EapiSessionBuilder {
    host: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    use_ssl: bool,
    validate_certs: bool,
    timeout: u64,
    base_url: Option<String>,
}

impl EapiSessionBuilder {
    /// Start building a session to `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: None,
            password: None,
            use_ssl: true,
            validate_certs: true,
            timeout: EAPI_DEFAULT_TIMEOUT,
            base_url: None,
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the username
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Use HTTPS (default) or plain HTTP
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Validate TLS certificates (default true)
    pub fn validate_certs(mut self, validate: bool) -> Self {
        self.validate_certs = validate;
        self
    }

    /// Default per-request timeout in seconds
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the endpoint entirely (e.g. `http://127.0.0.1:8080`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.use_ssl {
            EAPI_DEFAULT_HTTPS_PORT
        } else {
            EAPI_DEFAULT_HTTP_PORT
        })
    }

    fn url(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{}/command-api", base.trim_end_matches('/')),
            None => {
                let scheme = if self.use_ssl { "https" } else { "http" };
                format!("{}://{}:{}/command-api", scheme, self.host, self.effective_port())
            }
        }
    }

    /// Build the session and verify the credentials with one request
    pub async fn connect(self) -> ConnectionResult<EapiSession> {
        let username = self.username.clone().ok_or_else(|| {
            ConnectionError::InvalidConfig("username is required for the command API".to_string())
        })?;
        let password = self.password.clone().unwrap_or_default();

        let builder = Client::builder().timeout(Duration::from_secs(self.timeout));
        let builder = if self.use_ssl && !self.validate_certs {
            builder.danger_accept_invalid_certs(true)
        } else {
            builder
        };
        let client = builder.build().map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to create HTTP client: {}", e))
        })?;

        let session = EapiSession {
            url: self.url(),
            host: self.host,
            username,
            password,
            client,
            timeout: self.timeout,
            open: AtomicBool::new(true),
        };

        session
            .run_cmds(&["show hostname".to_string()], None)
            .await
            .map_err(|e| match e {
                ConnectionError::AuthenticationFailed(_) => e,
                other => ConnectionError::ConnectionFailed(other.to_string()),
            })?;

        debug!(host = %session.host, url = %session.url, "Command API session established");
        Ok(session)
    }
}
