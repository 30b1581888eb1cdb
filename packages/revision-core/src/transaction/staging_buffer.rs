use std::collections::{HashMap, HashSet};

use crate::error::VersionError;
use crate::value::RecordId;

use super::change::{ChangeOutcome, Operation, StagedChange};
use super::transaction::{TransactionId, TransactionState};

/// Per-record slot in the staging buffer.
#[derive(Debug)]
enum Slot {
    /// Net change waiting for commit
    Staged(StagedChange),
    /// Earlier changes cancelled out; remembers whether the record exists
    Cancelled { exists: bool },
}

/// Holds staged changes for a single transaction.
///
/// Changes are isolated from the version store until commit and keep the
/// order in which records were first touched.
#[derive(Debug)]
pub struct StagingBuffer {
    /// Owning transaction
    pub transaction_id: TransactionId,
    /// Lifecycle state, guarded together with the staged changes
    pub state: TransactionState,
    /// Staged changes in first-touch order
    slots: Vec<Slot>,
    /// Record to slot index
    index: HashMap<RecordId, usize>,
    /// Records claimed against concurrent transactions
    claimed: HashSet<RecordId>,
}

impl StagingBuffer {
    /// Creates an empty buffer for an active transaction.
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            state: TransactionState::Active,
            slots: Vec::new(),
            index: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    /// Fails unless the transaction is still active.
    pub fn ensure_active(&self) -> Result<(), VersionError> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(VersionError::InvalidTransactionState {
                transaction_id: self.transaction_id.as_u64(),
                reason: format!("transaction is {}", self.state),
            })
        }
    }

    /// Returns whether a change for `record` is currently staged.
    pub fn contains(&self, record: &RecordId) -> bool {
        self.index
            .get(record)
            .and_then(|&slot| self.slots.get(slot))
            .is_some_and(|slot| matches!(slot, Slot::Staged(_)))
    }

    /// Returns whether this transaction already holds the claim on `record`.
    pub fn has_claim(&self, record: &RecordId) -> bool {
        self.claimed.contains(record)
    }

    /// Records a claim taken on `record`.
    pub fn note_claim(&mut self, record: RecordId) {
        self.claimed.insert(record);
    }

    /// Stages a change, coalescing with an earlier change for the same record.
    ///
    /// Once earlier changes cancel out, the record's existence is kept so
    /// the next change is checked against it.
    ///
    /// # Arguments
    /// * `change` - Change built from the notification, `None` if it was a no-op update
    ///
    /// # Returns
    /// `Result<ChangeOutcome, VersionError>` describing what was staged.
    pub fn stage(
        &mut self,
        record: &RecordId,
        change: Option<StagedChange>,
    ) -> Result<ChangeOutcome, VersionError> {
        let Some(slot) = self.index.get(record).copied() else {
            return Ok(match change {
                None => ChangeOutcome::Suppressed,
                Some(change) => {
                    self.index.insert(record.clone(), self.slots.len());
                    self.slots.push(Slot::Staged(change));
                    ChangeOutcome::Staged
                }
            });
        };
        let Some(later) = change else {
            return Ok(ChangeOutcome::Suppressed);
        };

        match &self.slots[slot] {
            Slot::Cancelled { exists } => {
                check_existence(*exists, &later)?;
                self.slots[slot] = Slot::Staged(later);
                Ok(ChangeOutcome::Staged)
            }
            Slot::Staged(earlier) => {
                let was_insert = earlier.operation == Operation::Insert;
                match earlier.clone().coalesce(later)? {
                    Some(merged) => {
                        self.slots[slot] = Slot::Staged(merged);
                        Ok(ChangeOutcome::Coalesced)
                    }
                    None if was_insert => {
                        self.slots[slot] = Slot::Cancelled { exists: false };
                        Ok(ChangeOutcome::Discarded)
                    }
                    None => {
                        self.slots[slot] = Slot::Cancelled { exists: true };
                        Ok(ChangeOutcome::Suppressed)
                    }
                }
            }
        }
    }

    /// Returns the number of staged changes.
    pub fn len(&self) -> usize {
        self.changes().count()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the staged changes in first-touch order.
    pub fn changes(&self) -> impl Iterator<Item = &StagedChange> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Staged(change) => Some(change),
            Slot::Cancelled { .. } => None,
        })
    }

    /// Moves the buffer into a terminal state and hands back its content.
    ///
    /// # Returns
    /// Staged changes in order and the set of claimed records.
    pub fn finalize(
        &mut self,
        state: TransactionState,
    ) -> Result<(Vec<StagedChange>, Vec<RecordId>), VersionError> {
        self.ensure_active()?;
        self.state = state;
        let changes = std::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Staged(change) => Some(change),
                Slot::Cancelled { .. } => None,
            })
            .collect();
        self.index.clear();
        let claimed = std::mem::take(&mut self.claimed).into_iter().collect();
        Ok((changes, claimed))
    }
}

/// Rejects a change that contradicts whether the record currently exists.
fn check_existence(exists: bool, change: &StagedChange) -> Result<(), VersionError> {
    let valid = match change.operation {
        Operation::Insert => !exists,
        Operation::Update | Operation::Delete => exists,
    };
    if valid {
        return Ok(());
    }
    Err(VersionError::InvalidChange {
        record: change.record.to_string(),
        reason: if exists {
            format!("{} of a record that already exists", change.operation)
        } else {
            format!("{} of a record that no longer exists", change.operation)
        },
    })
}
