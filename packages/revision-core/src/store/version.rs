use serde::{Deserialize, Serialize};

use crate::diff::{diff_optional, ChangeSet};
use crate::transaction::{Operation, TransactionId};
use crate::value::{RecordId, Snapshot};

/// Weak reference to another version of the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    /// Referenced record
    pub record: RecordId,
    /// Referenced version number
    pub version_number: u64,
}

/// Immutable snapshot of a record as of one committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Versioned record (type and key)
    pub record: RecordId,
    /// Transaction that produced this version
    pub transaction_id: TransactionId,
    /// Per-record sequence number, 1-based
    pub version_number: u64,
    /// Operation recorded at this version
    pub operation: Operation,
    /// Full versioned field values; the last known state for a delete
    pub snapshot: Snapshot,
    /// Predecessor version, absent for the first version
    pub previous: Option<VersionRef>,
}

impl VersionEntry {
    /// Zero-based position in the record's history.
    pub fn index(&self) -> u64 {
        self.version_number.saturating_sub(1)
    }

    /// Reference to this version.
    pub fn version_ref(&self) -> VersionRef {
        VersionRef {
            record: self.record.clone(),
            version_number: self.version_number,
        }
    }

    /// Returns `true` if the record no longer exists after this version.
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    /// State of the record after this version, `None` once deleted.
    pub fn live_state(&self) -> Option<&Snapshot> {
        if self.is_delete() {
            None
        } else {
            Some(&self.snapshot)
        }
    }

    /// Changes introduced by this version relative to `previous`.
    ///
    /// An insert reports every field as added, a delete every field as
    /// removed.
    pub fn changeset(&self, previous: Option<&VersionEntry>) -> ChangeSet {
        let changes = match self.operation {
            Operation::Insert => diff_optional(None, Some(&self.snapshot)),
            Operation::Delete => diff_optional(Some(&self.snapshot), None),
            Operation::Update => {
                diff_optional(previous.and_then(VersionEntry::live_state), Some(&self.snapshot))
            }
        };
        changes.with_context(self.record.clone(), self.operation)
    }
}
