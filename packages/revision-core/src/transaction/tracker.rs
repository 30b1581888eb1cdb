use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::VersionError;
use crate::value::RecordId;

use super::change::StagedChange;
use super::transaction::{ActiveTransaction, TransactionId, TransactionRecord, TransactionState};

/// Content of a finalized transaction.
#[derive(Debug)]
pub struct FinalizedTransaction {
    /// Metadata captured at finalization
    pub record: TransactionRecord,
    /// Staged changes in first-touch order
    pub changes: Vec<StagedChange>,
    /// Records claimed by the transaction
    pub claimed: Vec<RecordId>,
}

/// Allocates transaction ids and tracks open transactions.
///
/// Ids come from a single atomic sequence shared by all writers, so they
/// are unique and strictly increasing across concurrent `begin` calls.
#[derive(Debug)]
pub struct TransactionTracker {
    /// Next id to hand out
    next_id: AtomicU64,
    /// Open transactions
    active: RwLock<HashMap<TransactionId, Arc<ActiveTransaction>>>,
}

impl TransactionTracker {
    /// Creates a tracker whose first id is `first_id`.
    pub fn new(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id.max(1)),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a transaction.
    pub fn begin(&self) -> Result<TransactionId, VersionError> {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let transaction = Arc::new(ActiveTransaction::new(id));
        self.active
            .write()
            .map_err(|_| VersionError::LockPoisoned)?
            .insert(id, transaction);
        tracing::debug!("Began transaction {}", id);
        Ok(id)
    }

    /// Returns the id the next `begin` would allocate.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id.load(Ordering::Acquire)
    }

    /// Looks up an open transaction.
    pub fn get(&self, id: TransactionId) -> Result<Arc<ActiveTransaction>, VersionError> {
        self.active
            .read()
            .map_err(|_| VersionError::LockPoisoned)?
            .get(&id)
            .cloned()
            .ok_or_else(|| VersionError::InvalidTransactionState {
                transaction_id: id.as_u64(),
                reason: "transaction is not active".to_string(),
            })
    }

    /// Attaches actor and context metadata to an open transaction.
    ///
    /// # Arguments
    /// * `id` - Open transaction
    /// * `actor` - Actor to record; `None` keeps the current one
    /// * `context` - Entries merged into the existing context
    pub fn set_context(
        &self,
        id: TransactionId,
        actor: Option<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), VersionError> {
        let transaction = self.get(id)?;
        let mut record = transaction
            .record
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?;
        if actor.is_some() {
            record.actor = actor;
        }
        record.context.extend(context);
        Ok(())
    }

    /// Moves an open transaction into a terminal state.
    ///
    /// Fails with `InvalidTransactionState` for unknown or already
    /// finalized ids.
    pub fn finalize(
        &self,
        id: TransactionId,
        state: TransactionState,
    ) -> Result<FinalizedTransaction, VersionError> {
        let transaction = self.get(id)?;
        let (changes, claimed) = transaction
            .buffer
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?
            .finalize(state)?;
        self.active
            .write()
            .map_err(|_| VersionError::LockPoisoned)?
            .remove(&id);
        let record = transaction.metadata()?;
        Ok(FinalizedTransaction {
            record,
            changes,
            claimed,
        })
    }

    /// Returns the ids of all open transactions, ascending.
    pub fn active_ids(&self) -> Result<Vec<TransactionId>, VersionError> {
        let mut ids: Vec<TransactionId> = self
            .active
            .read()
            .map_err(|_| VersionError::LockPoisoned)?
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new(1)
    }
}
