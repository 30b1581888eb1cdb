//! Read-side queries over one consistent history view.

use std::sync::Arc;

use crate::diff::{diff, ChangeSet};
use crate::error::Result;
use crate::store::{HistoryState, VersionEntry};
use crate::transaction::{TransactionId, TransactionRecord};
use crate::value::{RecordId, Snapshot};

/// Answers history questions against a fixed point in time.
///
/// Built from a [`HistoryState`] snapshot, so every answer from one
/// `QueryLayer` agrees with every other.
#[derive(Debug, Clone)]
pub struct QueryLayer {
    state: Arc<HistoryState>,
}

impl QueryLayer {
    /// Creates a query layer over `state`.
    pub fn new(state: Arc<HistoryState>) -> Self {
        Self { state }
    }

    /// Returns the underlying history view.
    pub fn state(&self) -> &Arc<HistoryState> {
        &self.state
    }

    /// Returns what each record touched by a transaction changed.
    ///
    /// # Arguments
    /// * `transaction_id` - Committed transaction
    ///
    /// # Returns
    /// One change set per version written, in the transaction's append
    /// order, each relative to that record's previous version.
    pub fn changes_in(&self, transaction_id: TransactionId) -> Result<Vec<ChangeSet>> {
        self.state
            .changes(transaction_id)?
            .into_iter()
            .map(|entry| {
                let previous = self.predecessor(entry)?;
                Ok(entry.changeset(previous))
            })
            .collect()
    }

    /// Computes the field changes turning version `from` into version `to`.
    pub fn diff_versions(&self, record: &RecordId, from: u64, to: u64) -> Result<ChangeSet> {
        let a = self.state.version(record, from)?;
        let b = self.state.version(record, to)?;
        let mut changes = diff(&a.snapshot, &b.snapshot);
        changes.record = Some(record.clone());
        Ok(changes)
    }

    /// Returns the version before `version_number`.
    ///
    /// `Ok(None)` when `version_number` is the record's first version.
    pub fn previous(&self, record: &RecordId, version_number: u64) -> Result<Option<VersionEntry>> {
        absent_as_none(self.state.previous(record, version_number))
    }

    /// Returns the version after `version_number`.
    ///
    /// `Ok(None)` when `version_number` is the record's latest version.
    pub fn next(&self, record: &RecordId, version_number: u64) -> Result<Option<VersionEntry>> {
        absent_as_none(self.state.next(record, version_number))
    }

    /// Returns the record's version as of `transaction_id`.
    pub fn version_at(
        &self,
        record: &RecordId,
        transaction_id: TransactionId,
    ) -> Result<Option<VersionEntry>> {
        Ok(self
            .state
            .version_at(record, transaction_id)?
            .map(|entry| VersionEntry::clone(entry)))
    }

    /// Returns the record's current state according to history.
    ///
    /// `Ok(None)` when the latest version is a delete.
    pub fn live_state(&self, record: &RecordId) -> Result<Option<Snapshot>> {
        let history = self.state.versions(record)?;
        Ok(history
            .last()
            .and_then(|entry| entry.live_state())
            .cloned())
    }

    /// Returns the record types touched by a transaction.
    pub fn changed_types(&self, transaction_id: TransactionId) -> Result<Vec<String>> {
        self.state.changed_types(transaction_id)
    }

    /// Returns the transactions issued by `actor`, ascending by id.
    pub fn transactions_by_actor(&self, actor: &str) -> Vec<TransactionRecord> {
        self.state
            .transactions()
            .filter(|t| t.actor.as_deref() == Some(actor))
            .cloned()
            .collect()
    }

    fn predecessor(&self, entry: &VersionEntry) -> Result<Option<&VersionEntry>> {
        match entry.previous {
            Some(ref previous) => {
                let entry = self.state.version(&previous.record, previous.version_number)?;
                Ok(Some(&**entry))
            }
            None => Ok(None),
        }
    }
}

fn absent_as_none(result: Result<&Arc<VersionEntry>>) -> Result<Option<VersionEntry>> {
    match result {
        Ok(entry) => Ok(Some(VersionEntry::clone(entry))),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}

impl From<Arc<HistoryState>> for QueryLayer {
    fn from(state: Arc<HistoryState>) -> Self {
        Self::new(state)
    }
}
