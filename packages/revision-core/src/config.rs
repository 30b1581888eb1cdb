//! Versioning configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How a transaction reacts when a record it wants to change is held by
/// another open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail immediately with `ConcurrentModification`
    FailFast,
    /// Block until the holder finalizes, up to `timeout_ms`
    Wait { timeout_ms: u64 },
}

impl ConflictPolicy {
    /// Returns the wait budget, `None` for fail-fast.
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self {
            ConflictPolicy::FailFast => None,
            ConflictPolicy::Wait { timeout_ms } => Some(Duration::from_millis(*timeout_ms)),
        }
    }
}

/// Versioning configuration.
#[derive(Debug, Clone)]
pub struct VersioningConfig {
    /// Master switch; when off, change notifications are ignored
    pub enabled: bool,
    /// Same-record conflict policy
    pub conflict_policy: ConflictPolicy,
    /// Write a transaction row even when nothing was versioned
    pub record_empty_transactions: bool,
    /// Directory for persisted history (None = memory only)
    pub data_dir: Option<PathBuf>,
    /// Maximum retry attempts for transient I/O errors
    pub persistence_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub persistence_retry_delay_ms: u64,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            conflict_policy: ConflictPolicy::FailFast,
            record_empty_transactions: false,
            data_dir: None,
            persistence_max_retries: 3,      // Default retry attempts
            persistence_retry_delay_ms: 100, // 100ms delay between retries
        }
    }
}
