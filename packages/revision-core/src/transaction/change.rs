use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;
use crate::value::{RecordId, Snapshot};

/// Kind of mutation recorded for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// What happened to a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// First change for the record in this transaction, staged
    Staged,
    /// Merged into an already staged change for the same record
    Coalesced,
    /// No versioned field differs; nothing staged
    Suppressed,
    /// Net effect cancelled out (insert then delete); nothing staged
    Discarded,
    /// Versioning disabled; notification ignored
    Disabled,
}

/// A change buffered for one record until commit.
///
/// Images are already restricted to the record type's versioned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    /// Changed record
    pub record: RecordId,
    /// Net operation within the transaction
    pub operation: Operation,
    /// State before the transaction touched the record
    pub before: Option<Snapshot>,
    /// Latest state written by the transaction
    pub after: Option<Snapshot>,
}

impl StagedChange {
    /// Builds a staged change from a single notification.
    ///
    /// Returns `Ok(None)` when an update leaves every versioned field
    /// unchanged.
    pub fn new(
        record: RecordId,
        operation: Operation,
        before: Option<Snapshot>,
        after: Option<Snapshot>,
    ) -> Result<Option<Self>, VersionError> {
        let change = match operation {
            Operation::Insert => {
                let after = after.ok_or_else(|| missing_image(&record, "insert", "after"))?;
                Self {
                    record,
                    operation,
                    before: None,
                    after: Some(after),
                }
            }
            Operation::Delete => {
                let before = before.ok_or_else(|| missing_image(&record, "delete", "before"))?;
                Self {
                    record,
                    operation,
                    before: Some(before),
                    after: None,
                }
            }
            Operation::Update => {
                let before = before.ok_or_else(|| missing_image(&record, "update", "before"))?;
                let after = after.ok_or_else(|| missing_image(&record, "update", "after"))?;
                if before == after {
                    return Ok(None);
                }
                Self {
                    record,
                    operation,
                    before: Some(before),
                    after: Some(after),
                }
            }
        };
        Ok(Some(change))
    }

    /// Folds a later change for the same record into this one.
    ///
    /// The original before image is kept and the latest after image wins.
    /// Returns `Ok(None)` when the net effect is nothing.
    pub fn coalesce(self, later: StagedChange) -> Result<Option<Self>, VersionError> {
        let record = self.record;
        let merged = match (self.operation, later.operation) {
            (Operation::Insert, Operation::Update) => Self {
                record,
                operation: Operation::Insert,
                before: None,
                after: later.after,
            },
            (Operation::Insert, Operation::Delete) => return Ok(None),
            (Operation::Update, Operation::Update) | (Operation::Delete, Operation::Insert) => {
                if self.before == later.after {
                    return Ok(None);
                }
                Self {
                    record,
                    operation: Operation::Update,
                    before: self.before,
                    after: later.after,
                }
            }
            (Operation::Update, Operation::Delete) => Self {
                record,
                operation: Operation::Delete,
                before: self.before,
                after: None,
            },
            (earlier, next) => {
                return Err(VersionError::InvalidChange {
                    record: record.to_string(),
                    reason: format!("{} after {} in the same transaction", next, earlier),
                })
            }
        };
        Ok(Some(merged))
    }

    /// Snapshot stored for this change: the after image, or the before
    /// image for a delete.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self.operation {
            Operation::Delete => self.before.as_ref(),
            Operation::Insert | Operation::Update => self.after.as_ref(),
        }
    }
}

fn missing_image(record: &RecordId, operation: &str, side: &str) -> VersionError {
    VersionError::InvalidChange {
        record: record.to_string(),
        reason: format!("{} requires a {} image", operation, side),
    }
}
