use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VersionError;

use super::staging_buffer::StagingBuffer;

/// Unique, monotonically increasing transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{}", self.0)
    }
}

/// Transaction lifecycle state.
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction still accepts changes
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Transaction metadata; a row of the `transactions` table once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction identifier
    pub id: TransactionId,
    /// When the transaction began
    pub issued_at: DateTime<Utc>,
    /// Opaque actor identifier
    pub actor: Option<String>,
    /// Free-form context
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl TransactionRecord {
    /// Creates metadata for a transaction issued now.
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            issued_at: Utc::now(),
            actor: None,
            context: BTreeMap::new(),
        }
    }
}

/// An open transaction: metadata plus its staging buffer.
#[derive(Debug)]
pub struct ActiveTransaction {
    /// Transaction identifier
    pub id: TransactionId,
    /// Metadata written on commit
    pub(crate) record: Mutex<TransactionRecord>,
    /// Staged changes and lifecycle state
    pub(crate) buffer: Mutex<StagingBuffer>,
}

impl ActiveTransaction {
    /// Creates a new active transaction.
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            record: Mutex::new(TransactionRecord::new(id)),
            buffer: Mutex::new(StagingBuffer::new(id)),
        }
    }

    /// Returns a copy of the current metadata.
    pub fn metadata(&self) -> Result<TransactionRecord, VersionError> {
        Ok(self
            .record
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?
            .clone())
    }

    /// Returns the number of staged changes.
    pub fn staged_count(&self) -> Result<usize, VersionError> {
        Ok(self
            .buffer
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?
            .len())
    }
}
