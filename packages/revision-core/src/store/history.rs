//! Immutable, published view of the version history.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::VersionError;
use crate::transaction::{StagedChange, TransactionId, TransactionRecord};
use crate::value::{RecordId, RecordKey};

use super::version::{VersionEntry, VersionRef};

type Versions = Arc<Vec<Arc<VersionEntry>>>;

/// A transaction row together with the versions it produced, prepared
/// for an atomic append.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    /// Transaction row
    pub transaction: TransactionRecord,
    /// Versions in staging order
    pub entries: Vec<VersionEntry>,
}

/// Point-in-time view of every transaction and version.
///
/// Never mutated once published; commits build a successor state.
#[derive(Debug, Clone, Default)]
pub struct HistoryState {
    /// Transaction rows by id
    transactions: BTreeMap<TransactionId, TransactionRecord>,
    /// Version history per record, ascending by version number
    versions: HashMap<RecordId, Versions>,
    /// Versions written by each transaction, in append order
    by_transaction: BTreeMap<TransactionId, Arc<Vec<VersionRef>>>,
    /// Keys with history, per record type
    by_type: HashMap<String, Arc<BTreeSet<RecordKey>>>,
}

impl HistoryState {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from persisted rows, checking its invariants.
    ///
    /// # Returns
    /// `DataCorruption` if version numbers are not contiguous from 1, a
    /// version points at a missing transaction, or a record has two
    /// versions in one transaction.
    pub fn rebuild(
        transactions: Vec<TransactionRecord>,
        mut entries: Vec<VersionEntry>,
    ) -> Result<Self, VersionError> {
        let mut state = Self::new();
        for transaction in transactions {
            state
                .by_transaction
                .insert(transaction.id, Arc::new(Vec::new()));
            if state.transactions.insert(transaction.id, transaction).is_some() {
                return Err(VersionError::DataCorruption(
                    "duplicate transaction row".to_string(),
                ));
            }
        }

        // Append order within a transaction follows (transaction, record).
        entries.sort_by(|a, b| {
            (a.transaction_id, &a.record, a.version_number).cmp(&(
                b.transaction_id,
                &b.record,
                b.version_number,
            ))
        });

        let mut per_record: HashMap<RecordId, Vec<VersionEntry>> = HashMap::new();
        for entry in entries {
            if !state.transactions.contains_key(&entry.transaction_id) {
                return Err(VersionError::DataCorruption(format!(
                    "version {} of {} references missing transaction {}",
                    entry.version_number, entry.record, entry.transaction_id
                )));
            }
            per_record.entry(entry.record.clone()).or_default().push(entry);
        }

        let mut ordered: Vec<VersionEntry> = Vec::new();
        for (record, mut history) in per_record {
            history.sort_by_key(|e| e.version_number);
            for (i, entry) in history.iter().enumerate() {
                let expected = i as u64 + 1;
                if entry.version_number != expected {
                    return Err(VersionError::DataCorruption(format!(
                        "{} has version {} where {} was expected",
                        record, entry.version_number, expected
                    )));
                }
                if i > 0 && history[i - 1].transaction_id >= entry.transaction_id {
                    return Err(VersionError::DataCorruption(format!(
                        "{} versions {} and {} are not in transaction order",
                        record,
                        i,
                        i + 1
                    )));
                }
            }
            ordered.extend(history);
        }

        ordered.sort_by(|a, b| {
            (a.transaction_id, &a.record).cmp(&(b.transaction_id, &b.record))
        });
        for entry in ordered {
            state.push_entry(entry);
        }
        Ok(state)
    }

    /// Assigns version numbers to staged changes.
    ///
    /// Each record gets the next integer after its current maximum. A
    /// record already versioned by a later transaction fails with
    /// `ConcurrentModification`.
    pub fn prepare(
        &self,
        transaction: TransactionRecord,
        changes: Vec<StagedChange>,
    ) -> Result<CommitBatch, VersionError> {
        if self.transactions.contains_key(&transaction.id) {
            return Err(VersionError::InvalidTransactionState {
                transaction_id: transaction.id.as_u64(),
                reason: "transaction already recorded".to_string(),
            });
        }

        let mut entries = Vec::with_capacity(changes.len());
        for change in changes {
            let latest = self.latest(&change.record);
            if let Some(latest) = latest.filter(|l| l.transaction_id > transaction.id) {
                // Versions of a record must stay in transaction order.
                return Err(VersionError::ConcurrentModification {
                    record: change.record.to_string(),
                    holder: latest.transaction_id.as_u64(),
                    requester: transaction.id.as_u64(),
                });
            }
            let previous = latest.map(|latest| latest.version_ref());
            let version_number = previous.as_ref().map_or(1, |p| p.version_number + 1);
            let snapshot = change.snapshot().cloned().ok_or_else(|| {
                VersionError::InvalidChange {
                    record: change.record.to_string(),
                    reason: "staged change carries no snapshot".to_string(),
                }
            })?;
            entries.push(VersionEntry {
                record: change.record,
                transaction_id: transaction.id,
                version_number,
                operation: change.operation,
                snapshot,
                previous,
            });
        }

        Ok(CommitBatch {
            transaction,
            entries,
        })
    }

    /// Builds the successor state containing `batch`.
    pub fn with_batch(&self, batch: &CommitBatch) -> Self {
        let mut next = self.clone();
        next.transactions
            .insert(batch.transaction.id, batch.transaction.clone());
        next.by_transaction
            .entry(batch.transaction.id)
            .or_insert_with(|| Arc::new(Vec::new()));
        for entry in &batch.entries {
            next.push_entry(entry.clone());
        }
        next
    }

    fn push_entry(&mut self, entry: VersionEntry) {
        let version_ref = entry.version_ref();
        Arc::make_mut(
            self.by_type
                .entry(entry.record.record_type.clone())
                .or_default(),
        )
        .insert(entry.record.key.clone());
        Arc::make_mut(self.by_transaction.entry(entry.transaction_id).or_default())
            .push(version_ref);
        Arc::make_mut(self.versions.entry(entry.record.clone()).or_default())
            .push(Arc::new(entry));
    }

    /// Returns the ordered history of a record.
    pub fn versions(&self, record: &RecordId) -> Result<&[Arc<VersionEntry>], VersionError> {
        self.versions
            .get(record)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VersionError::UnknownRecord {
                record: record.to_string(),
            })
    }

    /// Returns whether `record` has any recorded version.
    pub fn has_history(&self, record: &RecordId) -> bool {
        self.versions.get(record).is_some_and(|v| !v.is_empty())
    }

    /// Returns the latest version of a record, if any.
    pub fn latest(&self, record: &RecordId) -> Option<&Arc<VersionEntry>> {
        self.versions.get(record).and_then(|v| v.last())
    }

    /// Returns one version of a record.
    pub fn version(
        &self,
        record: &RecordId,
        version_number: u64,
    ) -> Result<&Arc<VersionEntry>, VersionError> {
        let history = self.versions(record)?;
        version_number
            .checked_sub(1)
            .and_then(|index| history.get(index as usize))
            .ok_or_else(|| VersionError::UnknownVersion {
                record: record.to_string(),
                version: version_number,
            })
    }

    /// Returns the version immediately before `version_number`.
    pub fn previous(
        &self,
        record: &RecordId,
        version_number: u64,
    ) -> Result<&Arc<VersionEntry>, VersionError> {
        let current = self.version(record, version_number)?;
        match current.previous {
            Some(ref previous) => self.version(record, previous.version_number),
            None => Err(VersionError::NoPriorVersion {
                record: record.to_string(),
                version: version_number,
            }),
        }
    }

    /// Returns the version immediately after `version_number`.
    pub fn next(
        &self,
        record: &RecordId,
        version_number: u64,
    ) -> Result<&Arc<VersionEntry>, VersionError> {
        self.version(record, version_number)?;
        self.version(record, version_number + 1)
            .map_err(|_| VersionError::NoNextVersion {
                record: record.to_string(),
                version: version_number,
            })
    }

    /// Returns the record's version with the greatest transaction id not
    /// after `transaction_id`.
    ///
    /// `Ok(None)` means the record has history but none that early.
    pub fn version_at(
        &self,
        record: &RecordId,
        transaction_id: TransactionId,
    ) -> Result<Option<&Arc<VersionEntry>>, VersionError> {
        let history = self.versions(record)?;
        let end = history.partition_point(|entry| entry.transaction_id <= transaction_id);
        Ok(end.checked_sub(1).map(|index| &history[index]))
    }

    /// Returns the versions written by a transaction, in append order.
    pub fn changes(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<&Arc<VersionEntry>>, VersionError> {
        let refs = self.by_transaction.get(&transaction_id).ok_or_else(|| {
            VersionError::UnknownTransaction {
                transaction_id: transaction_id.as_u64(),
            }
        })?;
        refs.iter()
            .map(|r| self.version(&r.record, r.version_number))
            .collect()
    }

    /// Returns the record types touched by a transaction, sorted.
    pub fn changed_types(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<String>, VersionError> {
        let refs = self.by_transaction.get(&transaction_id).ok_or_else(|| {
            VersionError::UnknownTransaction {
                transaction_id: transaction_id.as_u64(),
            }
        })?;
        let types: BTreeSet<String> = refs.iter().map(|r| r.record.record_type.clone()).collect();
        Ok(types.into_iter().collect())
    }

    /// Returns a transaction row.
    pub fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<&TransactionRecord, VersionError> {
        self.transactions
            .get(&transaction_id)
            .ok_or_else(|| VersionError::UnknownTransaction {
                transaction_id: transaction_id.as_u64(),
            })
    }

    /// Iterates over transaction rows, ascending by id.
    pub fn transactions(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.transactions.values()
    }

    /// Keys with history for a record type, ascending.
    pub fn keys_of_type(&self, record_type: &str) -> impl Iterator<Item = &RecordKey> {
        self.by_type
            .get(record_type)
            .into_iter()
            .flat_map(|keys| keys.iter())
    }

    /// Iterates over every version of every record.
    pub fn all_versions(&self) -> impl Iterator<Item = &Arc<VersionEntry>> {
        self.versions.values().flat_map(|v| v.iter())
    }

    /// Greatest committed transaction id.
    pub fn max_transaction_id(&self) -> Option<TransactionId> {
        self.transactions.keys().next_back().copied()
    }

    /// Number of transaction rows.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Total number of versions.
    pub fn version_count(&self) -> usize {
        self.versions.values().map(|v| v.len()).sum()
    }
}
