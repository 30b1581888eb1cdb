//! Append-only version store published through `ArcSwap`.
//!
//! Readers load an `Arc<HistoryState>` and see one consistent point in
//! time. Commits are serialized by a writer lock, build a successor
//! state and swap it in only after the host write has succeeded.

use std::fmt::Display;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::error::{Result, VersionError};
use crate::transaction::{StagedChange, TransactionId, TransactionRecord};
use crate::value::RecordId;

use super::history::{CommitBatch, HistoryState};
use super::version::VersionEntry;

/// Versioned history with lock-free reads.
#[derive(Debug)]
pub struct VersionStore {
    state: ArcSwap<HistoryState>,
    writer: Mutex<()>,
}

impl VersionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::from_state(HistoryState::new())
    }

    /// Creates a store seeded with previously loaded history.
    pub fn from_state(state: HistoryState) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(state)),
            writer: Mutex::new(()),
        }
    }

    /// Returns a read-consistent view of the whole history.
    pub fn snapshot(&self) -> Arc<HistoryState> {
        self.state.load_full()
    }

    /// Appends one committed transaction.
    ///
    /// Version numbers are assigned under the writer lock so concurrent
    /// commits never observe the same maximum.
    ///
    /// # Arguments
    /// * `transaction` - Transaction row to record
    /// * `changes` - Net staged changes, in staging order
    /// * `write` - Host write executed before the history is published
    ///
    /// # Returns
    /// The new versions. On a failed host write nothing is published and
    /// the error is returned as `Storage`.
    pub fn append<F, E>(
        &self,
        transaction: TransactionRecord,
        changes: Vec<StagedChange>,
        write: F,
    ) -> Result<Vec<VersionEntry>>
    where
        F: FnOnce(&CommitBatch) -> std::result::Result<(), E>,
        E: Display,
    {
        let _writer = self.writer.lock().map_err(|_| VersionError::LockPoisoned)?;

        let current = self.state.load_full();
        let batch = current.prepare(transaction, changes)?;
        write(&batch).map_err(|e| VersionError::Storage(e.to_string()))?;

        let next = current.with_batch(&batch);
        self.state.store(Arc::new(next));

        tracing::debug!(
            "Published transaction {} with {} version(s)",
            batch.transaction.id,
            batch.entries.len()
        );
        Ok(batch.entries)
    }

    /// Returns a record's history, ascending by version number.
    pub fn list_versions(&self, record: &RecordId) -> Result<Vec<VersionEntry>> {
        let state = self.snapshot();
        Ok(state
            .versions(record)?
            .iter()
            .map(|entry| VersionEntry::clone(entry))
            .collect())
    }

    /// Returns one version of a record.
    pub fn get_version(&self, record: &RecordId, version_number: u64) -> Result<VersionEntry> {
        let state = self.snapshot();
        let entry = state.version(record, version_number)?;
        Ok(VersionEntry::clone(entry))
    }

    /// Returns the latest version of a record.
    pub fn latest(&self, record: &RecordId) -> Result<VersionEntry> {
        let state = self.snapshot();
        state
            .latest(record)
            .map(|entry| VersionEntry::clone(entry))
            .ok_or_else(|| VersionError::UnknownRecord {
                record: record.to_string(),
            })
    }

    /// Returns the version before `version_number`, or `NoPriorVersion`.
    pub fn previous_version(&self, record: &RecordId, version_number: u64) -> Result<VersionEntry> {
        let state = self.snapshot();
        let entry = state.previous(record, version_number)?;
        Ok(VersionEntry::clone(entry))
    }

    /// Returns the version after `version_number`, or `NoNextVersion`.
    pub fn next_version(&self, record: &RecordId, version_number: u64) -> Result<VersionEntry> {
        let state = self.snapshot();
        let entry = state.next(record, version_number)?;
        Ok(VersionEntry::clone(entry))
    }

    /// Returns the record's state as of `transaction_id`.
    pub fn version_at(
        &self,
        record: &RecordId,
        transaction_id: TransactionId,
    ) -> Result<Option<VersionEntry>> {
        let state = self.snapshot();
        let entry = state.version_at(record, transaction_id)?;
        Ok(entry.map(|entry| VersionEntry::clone(entry)))
    }

    /// Returns every version written by a transaction.
    pub fn list_changes(&self, transaction_id: TransactionId) -> Result<Vec<VersionEntry>> {
        let state = self.snapshot();
        let changes = state.changes(transaction_id)?;
        Ok(changes
            .into_iter()
            .map(|entry| VersionEntry::clone(entry))
            .collect())
    }

    /// Returns the record types touched by a transaction.
    pub fn changed_types(&self, transaction_id: TransactionId) -> Result<Vec<String>> {
        self.snapshot().changed_types(transaction_id)
    }

    /// Returns one transaction row.
    pub fn transaction(&self, transaction_id: TransactionId) -> Result<TransactionRecord> {
        self.snapshot().transaction(transaction_id).cloned()
    }

    /// Returns all transaction rows, ascending by id.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.snapshot().transactions().cloned().collect()
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}
