//! Interactive SSH CLI sessions.
//!
//! Network operating systems do not run commands the way a Unix shell does:
//! configuration mode, enable mode and paging are all properties of one
//! interactive terminal. This session therefore keeps a single PTY shell open
//! for its whole lifetime, writes commands into it and reads until the device
//! prompt comes back. File transfers use separate channels (SCP by default,
//! SFTP optionally) on the same SSH connection.

use async_trait::async_trait;
use regex::Regex;
use russh::client::{Handle, Handler, Msg};
use russh::keys::key::PublicKey;
use russh::{Channel, ChannelMsg};
use russh_keys::load_secret_key;
use russh_sftp::client::SftpSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::{
    with_timeout, CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions,
    TransferOptions,
};

/// Default SSH port
const DEFAULT_PORT: u16 = 22;

/// Default per-command timeout in seconds
const DEFAULT_TIMEOUT: u64 = 60;

/// Terminal geometry requested for the shell
const TERMINAL_WIDTH: u32 = 511;
const TERMINAL_HEIGHT: u32 = 24;

/// Commands that disable paging and wrapping on CLI-style devices
const SESSION_PREPARATION: &[&str] = &["terminal length 0", "terminal width 511"];

/// Matches a CLI prompt at the end of the buffer, e.g. `R1#` or `sw1(config)#`
const GENERIC_PROMPT: &str = r"(?m)^[\w.\-@/:]+(\([\w.\-]+\))?[>#]\s*$";

/// How files are copied onto the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMethod {
    /// `scp -t` sink protocol over an exec channel (works on IOS)
    #[default]
    Scp,
    /// SFTP subsystem
    Sftp,
}

// ============================================================================
// Client Handler
// ============================================================================

/// russh client handler.
///
/// Network devices are commonly reached by address with no known_hosts
/// entry, so server keys are accepted and logged with their fingerprint.
struct ClientHandler {
    host: String,
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting device host key"
        );
        Ok(true)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Shell state shared by every command on the session.
struct Shell {
    channel: Channel<Msg>,
    prompt: Regex,
}

/// An interactive SSH session to one network device.
pub struct SshSession {
    host: String,
    handle: Mutex<Option<Handle<ClientHandler>>>,
    shell: Mutex<Option<Shell>>,
    timeout: u64,
    transfer_method: TransferMethod,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("transfer_method", &self.transfer_method)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Read from the shell until `pattern` matches the accumulated output.
    async fn read_until(
        channel: &mut Channel<Msg>,
        pattern: &Regex,
        timeout: Duration,
    ) -> ConnectionResult<String> {
        let deadline = Instant::now() + timeout;
        let mut buffer = Vec::new();

        loop {
            let text = String::from_utf8_lossy(&buffer);
            if pattern.is_match(&text) {
                return Ok(text.into_owned());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectionError::Timeout(timeout.as_secs()));
            }

            match tokio::time::timeout(remaining, channel.wait()).await {
                Ok(Some(ChannelMsg::Data { ref data })) => buffer.extend_from_slice(data),
                Ok(Some(ChannelMsg::ExtendedData { ref data, .. })) => {
                    buffer.extend_from_slice(data)
                }
                Ok(Some(ChannelMsg::Eof | ChannelMsg::Close)) | Ok(None) => {
                    return Err(ConnectionError::ConnectionClosed)
                }
                Ok(Some(_)) => {}
                Err(_) => return Err(ConnectionError::Timeout(timeout.as_secs())),
            }
        }
    }

    /// Write `line` followed by a newline into the shell.
    async fn send_line(channel: &Channel<Msg>, line: &str) -> ConnectionResult<()> {
        let data = format!("{}\n", line);
        channel
            .data(data.as_bytes())
            .await
            .map_err(|e| ConnectionError::ExecutionFailed(format!("Failed to write: {}", e)))
    }

    /// Strip the echoed command and the trailing prompt from raw output.
    fn clean_output(raw: &str, command: &str, prompt: &Regex) -> String {
        let normalized = raw.replace("\r\n", "\n").replace('\r', "");
        let mut lines: Vec<&str> = normalized.lines().collect();

        if lines
            .first()
            .map(|l| l.trim_end().ends_with(command.trim()))
            .unwrap_or(false)
        {
            lines.remove(0);
        }

        while let Some(last) = lines.last() {
            if last.trim().is_empty() || prompt.is_match(last) {
                lines.pop();
            } else {
                break;
            }
        }

        lines.join("\n")
    }

    /// Build a prompt regex anchored on the device's base prompt so output
    /// lines that happen to end in `#` are not mistaken for it.
    fn prompt_from_banner(banner: &str) -> ConnectionResult<Regex> {
        let generic = Regex::new(GENERIC_PROMPT)
            .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;
        let normalized = banner.replace('\r', "");
        let found = normalized
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| generic.is_match(line))
            .ok_or_else(|| {
                ConnectionError::ConnectionFailed("Could not detect device prompt".to_string())
            })?;

        let base = found
            .trim_end_matches(['#', '>'])
            .split('(')
            .next()
            .unwrap_or(found);
        Regex::new(&format!(r"(?m)^{}(\([\w.\-]+\))?[>#]\s*$", regex::escape(base)))
            .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))
    }

    async fn handle_or_closed(&self) -> ConnectionResult<tokio::sync::MutexGuard<'_, Option<Handle<ClientHandler>>>> {
        let guard = self.handle.lock().await;
        if guard.is_none() {
            return Err(ConnectionError::ConnectionClosed);
        }
        Ok(guard)
    }

    /// Copy `content` with the `scp -t` sink protocol.
    async fn scp_upload(&self, content: &[u8], remote: &str, mode: u32) -> ConnectionResult<()> {
        let guard = self.handle_or_closed().await?;
        let handle = guard.as_ref().ok_or(ConnectionError::ConnectionClosed)?;
        let mut channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to open channel: {}", e))
        })?;
        drop(guard);

        channel
            .exec(true, format!("scp -t {}", remote))
            .await
            .map_err(|e| ConnectionError::TransferFailed(format!("Failed to start scp: {}", e)))?;
        Self::scp_ack(&mut channel).await?;

        let file_name = remote.rsplit([':', '/']).next().unwrap_or(remote);
        let header = format!("C{:04o} {} {}\n", mode, content.len(), file_name);
        channel
            .data(header.as_bytes())
            .await
            .map_err(|e| ConnectionError::TransferFailed(e.to_string()))?;
        Self::scp_ack(&mut channel).await?;

        channel
            .data(content)
            .await
            .map_err(|e| ConnectionError::TransferFailed(e.to_string()))?;
        channel
            .data(&b"\0"[..])
            .await
            .map_err(|e| ConnectionError::TransferFailed(e.to_string()))?;
        Self::scp_ack(&mut channel).await?;

        let _ = channel.eof().await;
        Ok(())
    }

    /// Wait for the single status byte the scp sink answers with.
    async fn scp_ack(channel: &mut Channel<Msg>) -> ConnectionResult<()> {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } if !data.is_empty() => {
                    return match data[0] {
                        0 => Ok(()),
                        _ => Err(ConnectionError::TransferFailed(format!(
                            "scp rejected transfer: {}",
                            String::from_utf8_lossy(&data[1..]).trim()
                        ))),
                    };
                }
                ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                    return Err(ConnectionError::TransferFailed(format!(
                        "scp exited with status {}",
                        exit_status
                    )));
                }
                ChannelMsg::Eof | ChannelMsg::Close => break,
                _ => {}
            }
        }
        Err(ConnectionError::TransferFailed(
            "scp channel closed before acknowledging".to_string(),
        ))
    }

    /// Copy `content` over the SFTP subsystem.
    async fn sftp_upload(&self, content: &[u8], remote: &str) -> ConnectionResult<()> {
        let guard = self.handle_or_closed().await?;
        let handle = guard.as_ref().ok_or(ConnectionError::ConnectionClosed)?;
        let channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to open channel: {}", e))
        })?;
        drop(guard);

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to request SFTP subsystem: {}", e))
        })?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        let mut file = sftp.create(remote.to_string()).await?;
        file.write_all(content).await?;
        file.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for SshSession {
    fn identifier(&self) -> &str {
        &self.host
    }

    async fn is_alive(&self) -> bool {
        match self.handle.lock().await.as_ref() {
            Some(handle) => !handle.is_closed(),
            None => false,
        }
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        let timeout = Duration::from_secs(options.timeout.unwrap_or(self.timeout));

        let mut guard = self.shell.lock().await;
        let shell = guard.as_mut().ok_or(ConnectionError::ConnectionClosed)?;

        let pattern = match &options.expect {
            Some(expect) => Regex::new(expect)
                .map_err(|e| ConnectionError::InvalidConfig(format!("Bad expect pattern: {}", e)))?,
            None => shell.prompt.clone(),
        };

        trace!(host = %self.host, command = %command, "Sending command");
        Self::send_line(&shell.channel, command).await?;
        let raw = Self::read_until(&mut shell.channel, &pattern, timeout).await?;
        let output = Self::clean_output(&raw, command, &shell.prompt);

        Ok(CommandResult::success(output, String::new()))
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote: &str,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        let content = tokio::fs::read(local_path).await?;
        self.upload_content(&content, remote, options).await
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote: &str,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        let options = options.unwrap_or_default();
        let mode = options.mode.unwrap_or(0o644);
        debug!(host = %self.host, remote = %remote, bytes = content.len(), "Uploading file");

        with_timeout(options.timeout.or(Some(self.timeout)), async {
            match self.transfer_method {
                TransferMethod::Scp => self.scp_upload(content, remote, mode).await,
                TransferMethod::Sftp => self.sftp_upload(content, remote).await,
            }
        })
        .await
    }

    async fn close(&self) -> ConnectionResult<()> {
        if let Some(shell) = self.shell.lock().await.take() {
            let _ = shell.channel.eof().await;
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "English")
                .await
            {
                warn!(host = %self.host, error = %e, "Error during SSH disconnect");
            }
        }
        debug!(host = %self.host, "SSH session closed");
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`SshSession`]
#[derive(Debug, Clone)]
pub struct SshSessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    secret: Option<String>,
    key_file: Option<PathBuf>,
    use_keys: bool,
    timeout: u64,
    transfer_method: TransferMethod,
}

impl SshSessionBuilder {
    /// Start building a session to `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            secret: None,
            key_file: None,
            use_keys: false,
            timeout: DEFAULT_TIMEOUT,
            transfer_method: TransferMethod::default(),
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
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

    /// Set the enable secret; when present the session enters privileged mode
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Authenticate with this private key
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self.use_keys = true;
        self
    }

    /// Try key-based authentication before the password
    pub fn use_keys(mut self, use_keys: bool) -> Self {
        self.use_keys = use_keys;
        self
    }

    /// Per-command timeout in seconds
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Select how files are copied to the device
    pub fn transfer_method(mut self, method: TransferMethod) -> Self {
        self.transfer_method = method;
        self
    }

    /// Connect, authenticate and open the interactive shell
    pub async fn connect(self) -> ConnectionResult<SshSession> {
        let timeout = Duration::from_secs(self.timeout);
        let user = self.username.clone().ok_or_else(|| {
            ConnectionError::InvalidConfig("username is required for SSH".to_string())
        })?;

        let mut config = russh::client::Config::default();
        config.inactivity_timeout = Some(Duration::from_secs(self.timeout * 10));
        let config = Arc::new(config);

        let addr = format!("{}:{}", self.host, self.port);
        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(self.timeout))?
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;
        socket.set_nodelay(true).map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let handler = ClientHandler {
            host: self.host.clone(),
        };
        let mut handle = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e))
            })?;

        self.authenticate(&mut handle, &user).await?;

        let mut channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to open shell channel: {}", e))
        })?;
        channel
            .request_pty(true, "vt100", TERMINAL_WIDTH, TERMINAL_HEIGHT, 0, 0, &[])
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(format!("PTY request failed: {}", e)))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(format!("Shell request failed: {}", e)))?;

        let generic = Regex::new(GENERIC_PROMPT)
            .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;
        SshSession::send_line(&channel, "").await?;
        let banner = SshSession::read_until(&mut channel, &generic, timeout).await?;
        let mut prompt = SshSession::prompt_from_banner(&banner)?;

        if let Some(secret) = &self.secret {
            let password_prompt = Regex::new(r"(?i)password:\s*$")
                .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;
            SshSession::send_line(&channel, "enable").await?;
            SshSession::read_until(&mut channel, &password_prompt, timeout).await?;
            SshSession::send_line(&channel, secret).await?;
            let after = SshSession::read_until(&mut channel, &generic, timeout).await?;
            if !after.trim_end().ends_with('#') {
                return Err(ConnectionError::AuthenticationFailed(
                    "enable secret was rejected".to_string(),
                ));
            }
            prompt = SshSession::prompt_from_banner(&after)?;
        }

        for command in SESSION_PREPARATION {
            SshSession::send_line(&channel, command).await?;
            SshSession::read_until(&mut channel, &prompt, timeout).await?;
        }

        debug!(host = %self.host, prompt = %prompt.as_str(), "SSH session established");

        Ok(SshSession {
            host: self.host,
            handle: Mutex::new(Some(handle)),
            shell: Mutex::new(Some(Shell { channel, prompt })),
            timeout: self.timeout,
            transfer_method: self.transfer_method,
        })
    }

    /// Key first when requested, then password
    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        user: &str,
    ) -> ConnectionResult<()> {
        if self.use_keys {
            let key_path = self
                .key_file
                .clone()
                .or_else(|| dirs::home_dir().map(|h| h.join(".ssh").join("id_ed25519")));
            if let Some(path) = key_path {
                match load_secret_key(&path, None) {
                    Ok(key_pair) => {
                        let ok = handle
                            .authenticate_publickey(user, Arc::new(key_pair))
                            .await
                            .map_err(|e| {
                                ConnectionError::AuthenticationFailed(format!(
                                    "Key authentication failed for {}: {}",
                                    path.display(),
                                    e
                                ))
                            })?;
                        if ok {
                            debug!(key = %path.display(), "Authenticated using key");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        warn!(key = %path.display(), error = %e, "Failed to load private key")
                    }
                }
            }
        }

        if let Some(password) = &self.password {
            let ok = handle
                .authenticate_password(user, password)
                .await
                .map_err(|e| {
                    ConnectionError::AuthenticationFailed(format!(
                        "Password authentication failed: {}",
                        e
                    ))
                })?;
            if ok {
                debug!("Authenticated using password");
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "All authentication methods failed".to_string(),
        ))
    }
}
