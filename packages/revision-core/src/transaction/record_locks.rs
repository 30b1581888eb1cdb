use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::config::ConflictPolicy;
use crate::error::VersionError;
use crate::value::RecordId;

use super::transaction::TransactionId;

/// Per-record claims held by open transactions.
///
/// A transaction claims a record the first time it stages a change for
/// it and keeps the claim until it commits or rolls back, so two open
/// transactions never stage changes for the same record.
#[derive(Debug, Default)]
pub struct RecordLocks {
    /// Record to owning transaction
    owners: Mutex<HashMap<RecordId, TransactionId>>,
    /// Signalled whenever claims are released
    released: Condvar,
}

impl RecordLocks {
    /// Creates an empty claim table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `record` for `transaction_id`.
    ///
    /// Re-claiming a record already held by the same transaction succeeds.
    /// A record held by another transaction fails immediately under
    /// `FailFast`, or after the wait budget expires under `Wait`.
    pub fn claim(
        &self,
        record: &RecordId,
        transaction_id: TransactionId,
        policy: ConflictPolicy,
    ) -> Result<(), VersionError> {
        let deadline = policy.wait_timeout().map(|timeout| Instant::now() + timeout);
        let mut owners = self.owners.lock().map_err(|_| VersionError::LockPoisoned)?;

        loop {
            let holder = match owners.get(record) {
                None => {
                    owners.insert(record.clone(), transaction_id);
                    return Ok(());
                }
                Some(&holder) if holder == transaction_id => return Ok(()),
                Some(&holder) => holder,
            };

            let conflict = || VersionError::ConcurrentModification {
                record: record.to_string(),
                holder: holder.as_u64(),
                requester: transaction_id.as_u64(),
            };

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => {
                    tracing::warn!(
                        "Transaction {} conflicts with {} on {}",
                        transaction_id,
                        holder,
                        record
                    );
                    return Err(conflict());
                }
            };
            if remaining.is_zero() {
                tracing::warn!(
                    "Transaction {} timed out waiting for {} on {}",
                    transaction_id,
                    holder,
                    record
                );
                return Err(conflict());
            }

            let (guard, _) = self
                .released
                .wait_timeout(owners, remaining)
                .map_err(|_| VersionError::LockPoisoned)?;
            owners = guard;
        }
    }

    /// Releases the given claims held by `transaction_id` and wakes waiters.
    pub fn release(
        &self,
        transaction_id: TransactionId,
        records: &[RecordId],
    ) -> Result<(), VersionError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut owners = self.owners.lock().map_err(|_| VersionError::LockPoisoned)?;
        for record in records {
            if owners.get(record) == Some(&transaction_id) {
                owners.remove(record);
            }
        }
        drop(owners);
        self.released.notify_all();
        Ok(())
    }

    /// Returns the transaction currently holding `record`.
    pub fn holder(&self, record: &RecordId) -> Result<Option<TransactionId>, VersionError> {
        Ok(self
            .owners
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?
            .get(record)
            .copied())
    }
}
