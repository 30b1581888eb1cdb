//! Versioning engine tying the tracker, collector, store and revert
//! planner together.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use crate::config::VersioningConfig;
use crate::diff::ChangeSet;
use crate::error::{Result, VersionError};
use crate::persistence::HistoryPersistence;
use crate::query::QueryLayer;
use crate::registry::RecordRegistry;
use crate::revert::{CancelFlag, RevertEngine, RevertPlan};
use crate::store::{CommitBatch, HistoryState, VersionEntry, VersionStore};
use crate::transaction::{
    ChangeCollector, ChangeOutcome, FinalizedTransaction, Operation, RecordLocks,
    TransactionGuard, TransactionId, TransactionRecord, TransactionState, TransactionTracker,
};
use crate::value::{RecordId, RecordKey, Snapshot};

/// Versioning engine for one process.
///
/// Hosts report every record mutation with [`notify_change`] between
/// [`begin`] and [`commit`]; the engine turns the net changes into
/// immutable versions and answers history and revert queries.
///
/// [`notify_change`]: VersioningEngine::notify_change
/// [`begin`]: VersioningEngine::begin
/// [`commit`]: VersioningEngine::commit
#[derive(Debug)]
pub struct VersioningEngine {
    /// Engine configuration
    config: VersioningConfig,
    /// Registered record types, read-only after startup
    registry: Arc<RecordRegistry>,
    /// Open transactions and id allocation
    tracker: TransactionTracker,
    /// Same-record claims across open transactions
    locks: Arc<RecordLocks>,
    /// Change intake
    collector: ChangeCollector,
    /// Committed history
    store: VersionStore,
    /// File persistence, when `data_dir` is configured
    persistence: Option<HistoryPersistence>,
}

impl VersioningEngine {
    /// Creates an engine with empty history.
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `registry` - Versioned record types
    ///
    /// # Returns
    /// `RegistryError` if a relationship targets an unregistered type.
    pub fn new(config: VersioningConfig, registry: Arc<RecordRegistry>) -> Result<Self> {
        Self::with_history(config, registry, HistoryState::new(), 1)
    }

    /// Creates an engine and loads any history saved in `config.data_dir`.
    pub fn open(config: VersioningConfig, registry: Arc<RecordRegistry>) -> Result<Self> {
        let loaded = match config.data_dir {
            Some(ref dir) => HistoryPersistence::new(dir.clone(), &config).load(&registry)?,
            None => None,
        };
        match loaded {
            Some(history) => Self::with_history(
                config,
                registry,
                history.state,
                history.next_transaction_id,
            ),
            None => Self::new(config, registry),
        }
    }

    fn with_history(
        config: VersioningConfig,
        registry: Arc<RecordRegistry>,
        state: HistoryState,
        next_transaction_id: u64,
    ) -> Result<Self> {
        registry.validate()?;

        let locks = Arc::new(RecordLocks::new());
        let collector = ChangeCollector::new(
            Arc::clone(&registry),
            Arc::clone(&locks),
            config.conflict_policy,
        );
        let persistence = config
            .data_dir
            .as_ref()
            .map(|dir| HistoryPersistence::new(dir.clone(), &config));

        tracing::info!(
            "Versioning engine ready: {} record type(s), {} transaction(s), versioning {}",
            registry.len(),
            state.transaction_count(),
            if config.enabled { "enabled" } else { "disabled" }
        );

        Ok(Self {
            tracker: TransactionTracker::new(next_transaction_id),
            store: VersionStore::from_state(state),
            config,
            registry,
            locks,
            collector,
            persistence,
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    /// Returns the record-type registry.
    pub fn registry(&self) -> &Arc<RecordRegistry> {
        &self.registry
    }

    /// Starts a transaction.
    pub fn begin(&self) -> Result<TransactionId> {
        self.tracker.begin()
    }

    /// Starts a transaction that rolls back when dropped uncommitted.
    pub fn begin_guard(&self) -> Result<TransactionGuard<'_>> {
        Ok(TransactionGuard::new(self, self.begin()?))
    }

    /// Attaches actor and free-form context to an open transaction.
    ///
    /// # Arguments
    /// * `transaction_id` - Open transaction
    /// * `actor` - Acting user or service; `None` keeps the current value
    /// * `context` - Entries merged into the transaction context
    pub fn set_context(
        &self,
        transaction_id: TransactionId,
        actor: Option<&str>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.tracker
            .set_context(transaction_id, actor.map(str::to_string), context)
    }

    /// Reports one record mutation inside an open transaction.
    ///
    /// # Arguments
    /// * `transaction_id` - Open transaction
    /// * `key` - Primary key of the mutated record
    /// * `record_type` - Registered record type name
    /// * `operation` - Insert, update or delete
    /// * `before` - Image before the mutation (absent for insert)
    /// * `after` - Image after the mutation (absent for delete)
    ///
    /// # Returns
    /// What happened to the change. `Disabled` when versioning is off.
    pub fn notify_change(
        &self,
        transaction_id: TransactionId,
        key: RecordKey,
        record_type: &str,
        operation: Operation,
        before: Option<&Snapshot>,
        after: Option<&Snapshot>,
    ) -> Result<ChangeOutcome> {
        if !self.config.enabled {
            return Ok(ChangeOutcome::Disabled);
        }
        let transaction = self.tracker.get(transaction_id)?;
        self.collector
            .record_change(&transaction, key, record_type, operation, before, after)
    }

    /// Commits a transaction and publishes its versions.
    ///
    /// # Returns
    /// The versions written, empty when nothing changed.
    pub fn commit(&self, transaction_id: TransactionId) -> Result<Vec<VersionEntry>> {
        self.commit_with(transaction_id, |_| Ok::<(), Infallible>(()))
    }

    /// Commits a transaction together with the host's own write.
    ///
    /// `write` runs after version numbers are assigned and before the
    /// versions become visible. If it fails, nothing is published, the
    /// transaction ends rolled back and the failure is returned as
    /// `Storage`.
    ///
    /// # Arguments
    /// * `transaction_id` - Open transaction
    /// * `write` - Host write receiving the numbered batch
    pub fn commit_with<F, E>(&self, transaction_id: TransactionId, write: F) -> Result<Vec<VersionEntry>>
    where
        F: FnOnce(&CommitBatch) -> std::result::Result<(), E>,
        E: Display,
    {
        let FinalizedTransaction {
            record,
            changes,
            claimed,
        } = self
            .tracker
            .finalize(transaction_id, TransactionState::Committed)?;

        let result = if changes.is_empty() && !self.config.record_empty_transactions {
            write_empty(record, write)
        } else {
            self.store.append(record, changes, write)
        };

        // Claims outlive the publish so a waiting writer sees the new history.
        self.locks.release(transaction_id, &claimed)?;

        match result {
            Ok(entries) => {
                tracing::info!(
                    "Committed transaction {} with {} version(s)",
                    transaction_id,
                    entries.len()
                );
                Ok(entries)
            }
            Err(e) => {
                tracing::warn!("Commit of {} failed, rolled back: {}", transaction_id, e);
                Err(e)
            }
        }
    }

    /// Discards every change staged by a transaction.
    pub fn rollback(&self, transaction_id: TransactionId) -> Result<()> {
        let finalized = self
            .tracker
            .finalize(transaction_id, TransactionState::RolledBack)?;
        self.locks.release(transaction_id, &finalized.claimed)?;
        tracing::info!(
            "Rolled back transaction {} ({} staged change(s) discarded)",
            transaction_id,
            finalized.changes.len()
        );
        Ok(())
    }

    /// Returns the ids of all open transactions.
    pub fn active_transactions(&self) -> Result<Vec<TransactionId>> {
        self.tracker.active_ids()
    }

    /// Returns a read-consistent view of the whole history.
    pub fn history(&self) -> Arc<HistoryState> {
        self.store.snapshot()
    }

    /// Returns a query layer over the current history.
    pub fn query(&self) -> QueryLayer {
        QueryLayer::new(self.store.snapshot())
    }

    /// Returns one version of a record.
    pub fn get_version(&self, record: &RecordId, version_number: u64) -> Result<VersionEntry> {
        self.store.get_version(record, version_number)
    }

    /// Returns a record's history, ascending by version number.
    pub fn list_versions(&self, record: &RecordId) -> Result<Vec<VersionEntry>> {
        self.store.list_versions(record)
    }

    /// Returns a record's latest version.
    pub fn latest(&self, record: &RecordId) -> Result<VersionEntry> {
        self.store.latest(record)
    }

    /// Returns the versions written by a transaction.
    pub fn list_changes(&self, transaction_id: TransactionId) -> Result<Vec<VersionEntry>> {
        self.store.list_changes(transaction_id)
    }

    /// Returns one change set per version written by a transaction.
    pub fn changes_in(&self, transaction_id: TransactionId) -> Result<Vec<ChangeSet>> {
        self.query().changes_in(transaction_id)
    }

    /// Computes the changes between two versions of a record.
    pub fn diff_versions(&self, record: &RecordId, from: u64, to: u64) -> Result<ChangeSet> {
        self.query().diff_versions(record, from, to)
    }

    /// Returns the version before `version_number`, `None` for the first.
    pub fn previous(&self, record: &RecordId, version_number: u64) -> Result<Option<VersionEntry>> {
        self.query().previous(record, version_number)
    }

    /// Returns the version after `version_number`, `None` for the latest.
    pub fn next(&self, record: &RecordId, version_number: u64) -> Result<Option<VersionEntry>> {
        self.query().next(record, version_number)
    }

    /// Returns the record's version as of `transaction_id`.
    pub fn version_at(
        &self,
        record: &RecordId,
        transaction_id: TransactionId,
    ) -> Result<Option<VersionEntry>> {
        self.store.version_at(record, transaction_id)
    }

    /// Returns the record types touched by a transaction.
    pub fn changed_types(&self, transaction_id: TransactionId) -> Result<Vec<String>> {
        self.store.changed_types(transaction_id)
    }

    /// Returns a committed transaction row.
    pub fn transaction(&self, transaction_id: TransactionId) -> Result<TransactionRecord> {
        self.store.transaction(transaction_id)
    }

    /// Returns every committed transaction row.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.store.transactions()
    }

    /// Returns the transactions issued by `actor`.
    pub fn transactions_by_actor(&self, actor: &str) -> Vec<TransactionRecord> {
        self.query().transactions_by_actor(actor)
    }

    /// Plans a revert of `record` to `target_version`.
    ///
    /// Nothing is written; apply the plan with [`apply_revert`] or through
    /// the host's own write path.
    ///
    /// [`apply_revert`]: VersioningEngine::apply_revert
    pub fn revert(&self, record: &RecordId, target_version: u64, cascade: bool) -> Result<RevertPlan> {
        let state = self.store.snapshot();
        RevertEngine::new(&self.registry, &state).plan(record, target_version, cascade)
    }

    /// Like [`revert`](VersioningEngine::revert), aborting with
    /// `Cancelled` once `cancel` is raised.
    pub fn revert_with_cancel(
        &self,
        record: &RecordId,
        target_version: u64,
        cascade: bool,
        cancel: &CancelFlag,
    ) -> Result<RevertPlan> {
        let state = self.store.snapshot();
        RevertEngine::new(&self.registry, &state)
            .with_cancel(cancel)
            .plan(record, target_version, cascade)
    }

    /// Applies a revert plan as one new transaction.
    ///
    /// Each record goes through the normal change path, so records already
    /// in their target state produce no version. Not cancellable.
    ///
    /// # Arguments
    /// * `plan` - Plan from [`revert`](VersioningEngine::revert)
    /// * `actor` - Actor recorded on the reverting transaction
    /// * `write` - Host write applying the states atomically
    pub fn apply_revert<F, E>(
        &self,
        plan: &RevertPlan,
        actor: Option<&str>,
        write: F,
    ) -> Result<Vec<VersionEntry>>
    where
        F: FnOnce(&CommitBatch) -> std::result::Result<(), E>,
        E: Display,
    {
        let transaction_id = self.begin()?;
        if let Err(e) = self.stage_revert(transaction_id, plan, actor) {
            if let Err(rollback_err) = self.rollback(transaction_id) {
                tracing::error!("Rollback of {} failed: {}", transaction_id, rollback_err);
            }
            return Err(e);
        }
        self.commit_with(transaction_id, write)
    }

    fn stage_revert(
        &self,
        transaction_id: TransactionId,
        plan: &RevertPlan,
        actor: Option<&str>,
    ) -> Result<()> {
        let mut context = BTreeMap::new();
        context.insert(
            "revert_of".to_string(),
            serde_json::Value::String(plan.root.to_string()),
        );
        context.insert(
            "revert_cutoff".to_string(),
            serde_json::Value::from(plan.cutoff.as_u64()),
        );
        self.set_context(transaction_id, actor, context)?;

        let query = self.query();
        for reverted in &plan.records {
            let current = query.live_state(&reverted.record)?;
            let operation = match current {
                Some(_) => Operation::Update,
                None => Operation::Insert,
            };
            self.notify_change(
                transaction_id,
                reverted.record.key.clone(),
                &reverted.record.record_type,
                operation,
                current.as_ref(),
                Some(&reverted.snapshot),
            )?;
        }
        Ok(())
    }

    /// Saves the committed history to `data_dir`.
    ///
    /// No-op when no data directory is configured.
    pub fn flush(&self) -> Result<()> {
        let Some(ref persistence) = self.persistence else {
            tracing::debug!("Flush skipped: no data directory configured");
            return Ok(());
        };
        let state = self.store.snapshot();
        persistence.save(&self.registry, &state, self.tracker.peek_next_id())
    }
}

fn write_empty<F, E>(record: TransactionRecord, write: F) -> Result<Vec<VersionEntry>>
where
    F: FnOnce(&CommitBatch) -> std::result::Result<(), E>,
    E: Display,
{
    let batch = CommitBatch {
        transaction: record,
        entries: Vec::new(),
    };
    write(&batch).map_err(|e| VersionError::Storage(e.to_string()))?;
    tracing::debug!("Transaction {} versioned nothing", batch.transaction.id);
    Ok(Vec::new())
}
