//! Value types shared by the state machine and the vendor adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Staging Mode
// ============================================================================

/// How a candidate relates to the running configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// The candidate wholly replaces the running configuration.
    Replace,
    /// The candidate is layered onto the running configuration.
    Merge,
}

impl std::fmt::Display for StagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingMode::Replace => write!(f, "replace"),
            StagingMode::Merge => write!(f, "merge"),
        }
    }
}

// ============================================================================
// Candidate Source
// ============================================================================

/// Where the candidate text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    /// A file on the control host.
    File(PathBuf),
    /// Configuration text held in memory.
    Text(String),
}

/// The two source shapes, for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local file path
    File,
    /// Inline text
    Inline,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Inline => write!(f, "inline text"),
        }
    }
}

impl CandidateSource {
    /// Candidate from a local file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        CandidateSource::File(path.into())
    }

    /// Candidate from inline text
    pub fn text(config: impl Into<String>) -> Self {
        CandidateSource::Text(config.into())
    }

    /// Which shape this source has
    pub fn kind(&self) -> SourceKind {
        match self {
            CandidateSource::File(_) => SourceKind::File,
            CandidateSource::Text(_) => SourceKind::Inline,
        }
    }

    /// The local path, for file sources
    pub fn path(&self) -> Option<&Path> {
        match self {
            CandidateSource::File(path) => Some(path),
            CandidateSource::Text(_) => None,
        }
    }

    /// Read the candidate text, whichever shape it has.
    pub async fn read(&self) -> std::io::Result<String> {
        match self {
            CandidateSource::File(path) => tokio::fs::read_to_string(path).await,
            CandidateSource::Text(text) => Ok(text.clone()),
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateSource::File(path) => write!(f, "{}", path.display()),
            CandidateSource::Text(text) => write!(f, "<inline, {} bytes>", text.len()),
        }
    }
}

// ============================================================================
// Candidate Target
// ============================================================================

/// Where an adapter staged the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateTarget {
    /// A named file on the device, e.g. `flash:candidate_config.txt`.
    DeviceFile {
        /// Device file system including the trailing colon
        file_system: String,
        /// File name within the file system
        name: String,
    },
    /// A vendor-managed configuration session.
    ConfigSession {
        /// Session name; must be aborted on discard
        name: String,
    },
    /// Kept on the control host; nothing has touched the device.
    Local {
        /// The candidate text
        text: String,
    },
}

impl CandidateTarget {
    /// `file_system` + `name` for device files
    pub fn device_path(&self) -> Option<String> {
        match self {
            CandidateTarget::DeviceFile { file_system, name } => {
                Some(format!("{}{}", file_system, name))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CandidateTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateTarget::DeviceFile { file_system, name } => {
                write!(f, "{}{}", file_system, name)
            }
            CandidateTarget::ConfigSession { name } => write!(f, "session {}", name),
            CandidateTarget::Local { .. } => write!(f, "local"),
        }
    }
}

// ============================================================================
// Candidate Config
// ============================================================================

/// A staged-but-not-yet-active configuration.
#[derive(Debug, Clone)]
pub struct CandidateConfig {
    /// Where the text came from
    pub source: CandidateSource,
    /// Where the adapter put it
    pub target: CandidateTarget,
    /// Replace or merge
    pub mode: StagingMode,
    /// When staging completed
    pub staged_at: DateTime<Utc>,
}

impl CandidateConfig {
    /// Record a successfully staged candidate
    pub fn new(source: CandidateSource, target: CandidateTarget, mode: StagingMode) -> Self {
        Self {
            source,
            target,
            mode,
            staged_at: Utc::now(),
        }
    }
}

// ============================================================================
// Config Diff
// ============================================================================

/// How far a diff can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFidelity {
    /// Computed by the device against its own running configuration.
    Device,
    /// Computed on the control host; the device has not seen the candidate.
    Estimated,
}

/// Delta between a candidate and the running configuration.
///
/// Derived on each compare and never stored; it goes stale as soon as the
/// running configuration changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDiff {
    text: String,
    fidelity: DiffFidelity,
}

impl ConfigDiff {
    /// A diff with the given text
    pub fn new(text: impl Into<String>, fidelity: DiffFidelity) -> Self {
        Self {
            text: text.into().trim().to_string(),
            fidelity,
        }
    }

    /// An empty diff
    pub fn empty(fidelity: DiffFidelity) -> Self {
        Self {
            text: String::new(),
            fidelity,
        }
    }

    /// Diff text, possibly empty
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the device computed this diff
    pub fn fidelity(&self) -> DiffFidelity {
        self.fidelity
    }

    /// Nothing would change
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Lines that would be added
    pub fn additions(&self) -> usize {
        self.text
            .lines()
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .count()
    }

    /// Lines that would be removed
    pub fn deletions(&self) -> usize {
        self.text
            .lines()
            .filter(|l| l.starts_with('-') && !l.starts_with("---"))
            .count()
    }
}

impl std::fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

// ============================================================================
// Rollback Point
// ============================================================================

/// A device-resident prior configuration.
///
/// Not created by the transaction layer on request; adapters that support
/// rollback keep the single most recent one at a fixed location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    /// Device location, e.g. `flash:rollback_config.txt`
    pub location: String,
}

impl std::fmt::Display for RollbackPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.location)
    }
}

// ============================================================================
// Transaction State
// ============================================================================

/// States of the configuration transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// No candidate staged, no lock held
    Idle,
    /// A load is in progress
    Loading,
    /// A candidate is staged and the lock is held
    Staged(StagingMode),
    /// Terminal: candidate applied and persisted
    Committed,
    /// Terminal: candidate abandoned
    Discarded,
    /// Terminal: rollback point restored
    RolledBack,
}

impl TransactionState {
    /// Terminal states immediately return the machine to `Idle`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Discarded | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Idle => write!(f, "idle"),
            TransactionState::Loading => write!(f, "loading"),
            TransactionState::Staged(mode) => write!(f, "staged ({})", mode),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::Discarded => write!(f, "discarded"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// The most recent terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Terminal state reached
    pub state: TransactionState,
    /// Whether the operation reported success
    pub succeeded: bool,
    /// When it happened
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_counts() {
        let diff = ConfigDiff::new(
            "+hostname R2\n-hostname R1\n+ip domain-name lab\n",
            DiffFidelity::Device,
        );
        assert_eq!(diff.additions(), 2);
        assert_eq!(diff.deletions(), 1);
        assert!(!diff.is_empty());
        assert_eq!(diff.fidelity(), DiffFidelity::Device);
    }

    #[test]
    fn test_whitespace_only_diff_is_empty() {
        assert!(ConfigDiff::new("\n  \n", DiffFidelity::Device).is_empty());
    }

    #[test]
    fn test_target_device_path() {
        let target = CandidateTarget::DeviceFile {
            file_system: "flash:".to_string(),
            name: "candidate_config.txt".to_string(),
        };
        assert_eq!(target.device_path().as_deref(), Some("flash:candidate_config.txt"));
        assert_eq!(target.to_string(), "flash:candidate_config.txt");

        let session = CandidateTarget::ConfigSession {
            name: "netcfg_1".to_string(),
        };
        assert_eq!(session.device_path(), None);
    }

    #[tokio::test]
    async fn test_source_read_inline() {
        let source = CandidateSource::text("hostname R1\n");
        assert_eq!(source.kind(), SourceKind::Inline);
        assert_eq!(source.read().await.unwrap(), "hostname R1\n");
        assert!(source.path().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransactionState::Staged(StagingMode::Merge).to_string(), "staged (merge)");
        assert!(TransactionState::Committed.is_terminal());
        assert!(!TransactionState::Loading.is_terminal());
    }
}
