//! Versioning error types.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VersionError>;

/// Versioning operation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VersionError {
    /// Commit or rollback on an unknown or already finalized transaction
    #[error("Invalid transaction state for transaction {transaction_id}: {reason}")]
    InvalidTransactionState { transaction_id: u64, reason: String },

    /// Transaction id with no committed transaction row
    #[error("Unknown transaction {transaction_id}")]
    UnknownTransaction { transaction_id: u64 },

    /// Query against a record with no recorded versions
    #[error("Unknown record {record}")]
    UnknownRecord { record: String },

    /// Version number not present in a record's history
    #[error("Version {version} not found for record {record}")]
    UnknownVersion { record: String, version: u64 },

    /// `previous` asked for the predecessor of a first version
    #[error("Version {version} of record {record} has no prior version")]
    NoPriorVersion { record: String, version: u64 },

    /// `next` asked for the successor of the latest version
    #[error("Version {version} of record {record} has no next version")]
    NoNextVersion { record: String, version: u64 },

    /// Two open transactions raced on the same record
    #[error("Record {record} is being modified by transaction {holder}; transaction {requester} must retry")]
    ConcurrentModification {
        record: String,
        holder: u64,
        requester: u64,
    },

    /// Cascading revert could not resolve a related record
    #[error("Unresolved dependency {source_record} -> {field}: {reason}")]
    UnresolvedDependency {
        source_record: String,
        field: String,
        reason: String,
    },

    /// Record type was never registered
    #[error("Record type '{record_type}' is not registered")]
    UnknownRecordType { record_type: String },

    /// Change notification that contradicts the record's staged state
    #[error("Invalid change for record {record}: {reason}")]
    InvalidChange { record: String, reason: String },

    /// Record type registration rejected
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// Revert planning cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Host write failed during commit
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error during persistence
    #[error("I/O error: {0}")]
    IoError(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIoError(String),

    /// Disk full error during persistence
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Data corruption detected
    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    /// Lock poisoned
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl VersionError {
    /// Returns `true` for errors that signal an absent value rather than a failure.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            VersionError::NoPriorVersion { .. } | VersionError::NoNextVersion { .. }
        )
    }

    /// Returns `true` if retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VersionError::ConcurrentModification { .. } | VersionError::TransientIoError(_)
        )
    }
}
