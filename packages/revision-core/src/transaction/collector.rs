use std::sync::Arc;

use crate::config::ConflictPolicy;
use crate::error::VersionError;
use crate::registry::RecordRegistry;
use crate::value::{RecordId, RecordKey, Snapshot};

use super::change::{ChangeOutcome, Operation, StagedChange};
use super::record_locks::RecordLocks;
use super::transaction::ActiveTransaction;

/// Classifies per-record notifications and buffers them per transaction.
///
/// Images are restricted to the record type's versioned fields before
/// comparison, so updates touching only excluded fields are suppressed.
#[derive(Debug)]
pub struct ChangeCollector {
    registry: Arc<RecordRegistry>,
    locks: Arc<RecordLocks>,
    policy: ConflictPolicy,
}

impl ChangeCollector {
    /// Creates a collector over a registry and a shared claim table.
    pub fn new(registry: Arc<RecordRegistry>, locks: Arc<RecordLocks>, policy: ConflictPolicy) -> Self {
        Self {
            registry,
            locks,
            policy,
        }
    }

    /// Records one mutation of one record inside `transaction`.
    ///
    /// # Arguments
    /// * `transaction` - Open transaction receiving the change
    /// * `record_key` - Primary key of the changed record
    /// * `record_type` - Registered type name
    /// * `operation` - Insert, update or delete
    /// * `before_image` - State before the mutation (absent for insert)
    /// * `after_image` - State after the mutation (absent for delete)
    ///
    /// # Returns
    /// `Result<ChangeOutcome, VersionError>` describing what was staged.
    pub fn record_change(
        &self,
        transaction: &ActiveTransaction,
        record_key: RecordKey,
        record_type: &str,
        operation: Operation,
        before_image: Option<&Snapshot>,
        after_image: Option<&Snapshot>,
    ) -> Result<ChangeOutcome, VersionError> {
        let definition = self.registry.require(record_type)?;
        let before = before_image.map(|image| definition.project(image));
        let after = after_image.map(|image| definition.project(image));
        let record = RecordId::new(record_type, record_key);

        for image in [&before, &after].into_iter().flatten() {
            if let Some(image_key) = definition.key_of(image) {
                if image_key != record.key {
                    return Err(VersionError::InvalidChange {
                        record: record.to_string(),
                        reason: format!("image carries key {}", image_key),
                    });
                }
            }
        }

        let change = StagedChange::new(record.clone(), operation, before, after)?;

        let mut buffer = transaction
            .buffer
            .lock()
            .map_err(|_| VersionError::LockPoisoned)?;
        buffer.ensure_active()?;

        if change.is_some() && !buffer.has_claim(&record) {
            self.locks.claim(&record, transaction.id, self.policy)?;
            buffer.note_claim(record.clone());
        }

        let outcome = buffer.stage(&record, change)?;
        match outcome {
            ChangeOutcome::Suppressed => {
                tracing::debug!("Suppressed no-op {} of {} in {}", operation, record, transaction.id)
            }
            _ => tracing::debug!(
                "{:?} {} of {} in {}",
                outcome,
                operation,
                record,
                transaction.id
            ),
        }
        Ok(outcome)
    }
}
