use crate::engine::VersioningEngine;
use crate::error::Result;
use crate::store::VersionEntry;
use crate::value::{RecordKey, Snapshot};

use super::change::{ChangeOutcome, Operation};
use super::transaction::TransactionId;

/// RAII guard for a versioning transaction with auto-rollback on drop.
///
/// If the transaction is neither committed nor rolled back explicitly,
/// it is rolled back when the guard is dropped.
#[derive(Debug)]
pub struct TransactionGuard<'e> {
    engine: &'e VersioningEngine,
    id: TransactionId,
    finished: bool,
}

impl<'e> TransactionGuard<'e> {
    pub(crate) fn new(engine: &'e VersioningEngine, id: TransactionId) -> Self {
        Self {
            engine,
            id,
            finished: false,
        }
    }

    /// Returns the guarded transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Reports a change inside the guarded transaction.
    ///
    /// # Arguments
    /// * `key` - Primary key of the changed record
    /// * `record_type` - Registered record type name
    /// * `operation` - Insert, update or delete
    /// * `before` - Image before the change, required for update and delete
    /// * `after` - Image after the change, required for insert and update
    pub fn notify_change(
        &self,
        key: RecordKey,
        record_type: &str,
        operation: Operation,
        before: Option<&Snapshot>,
        after: Option<&Snapshot>,
    ) -> Result<ChangeOutcome> {
        self.engine
            .notify_change(self.id, key, record_type, operation, before, after)
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> Result<Vec<VersionEntry>> {
        self.finished = true;
        self.engine.commit(self.id)
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.engine.rollback(self.id)
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.engine.rollback(self.id) {
                tracing::warn!("Auto-rollback of {} failed: {}", self.id, e);
            }
        }
    }
}
