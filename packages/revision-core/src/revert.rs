//! Revert planning with optional cascade over relationship edges.
//!
//! Planning reads one consistent history view and returns every resolved
//! target state together. Nothing is written here; callers apply a plan
//! through the normal change path (see `VersioningEngine::apply_revert`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diff::{diff_optional, ChangeSet};
use crate::error::{Result, VersionError};
use crate::registry::{Cardinality, EdgeDirection, RecordRegistry, RelationshipEdge};
use crate::store::{HistoryState, VersionEntry};
use crate::transaction::{Operation, TransactionId};
use crate::value::{FieldValue, RecordId, RecordKey, Snapshot};

/// Shared flag used to cancel revert planning from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How the storage layer must apply a reverted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertAction {
    /// Record exists; overwrite it with the target state
    Restore,
    /// Record is currently deleted; recreate it
    Resurrect,
}

/// Target state resolved for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertedRecord {
    /// Reverted record
    pub record: RecordId,
    /// Insert-like or update-like application
    pub action: RevertAction,
    /// Version whose snapshot is restored
    pub target_version: u64,
    /// State to write
    pub snapshot: Snapshot,
    /// Changes from the current state to `snapshot`
    pub changes: ChangeSet,
}

impl RevertedRecord {
    /// Returns `true` if applying this state would change nothing.
    pub fn is_noop(&self) -> bool {
        self.action == RevertAction::Restore && self.changes.is_empty()
    }
}

/// Consistent batch of states produced by one revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertPlan {
    /// Record the revert was requested for
    pub root: RecordId,
    /// Transaction of the root's target version; related records are
    /// resolved as of this transaction
    pub cutoff: TransactionId,
    /// Resolved states, root first, each record once
    pub records: Vec<RevertedRecord>,
}

impl RevertPlan {
    /// Returns the resolved state of `record`, if the plan contains it.
    pub fn get(&self, record: &RecordId) -> Option<&RevertedRecord> {
        self.records.iter().find(|r| &r.record == record)
    }

    /// Returns `true` if applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.records.iter().all(RevertedRecord::is_noop)
    }

    /// Iterates over the records that need writing.
    pub fn pending(&self) -> impl Iterator<Item = &RevertedRecord> {
        self.records.iter().filter(|r| !r.is_noop())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Resolving,
    Reverted,
}

/// Plans reverts against a fixed history view.
pub struct RevertEngine<'a> {
    registry: &'a RecordRegistry,
    state: &'a HistoryState,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> RevertEngine<'a> {
    /// Creates a planner over `state`.
    pub fn new(registry: &'a RecordRegistry, state: &'a HistoryState) -> Self {
        Self {
            registry,
            state,
            cancel: None,
        }
    }

    /// Makes planning abort with `Cancelled` once `flag` is raised.
    pub fn with_cancel(mut self, flag: &'a CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Resolves the state needed to bring `record` back to `target_version`.
    ///
    /// # Arguments
    /// * `record` - Record to revert
    /// * `target_version` - Version whose snapshot should become current
    /// * `cascade` - Also revert records reachable through relationship edges
    ///
    /// # Returns
    /// The full plan, or an error with nothing planned.
    pub fn plan(&self, record: &RecordId, target_version: u64, cascade: bool) -> Result<RevertPlan> {
        let target = self.state.version(record, target_version)?;
        let cutoff = target.transaction_id;
        tracing::debug!(
            "Planning revert of {} to version {} (cutoff {}, cascade {})",
            record,
            target_version,
            cutoff,
            cascade
        );

        let mut walk = Walk {
            visits: HashMap::new(),
            records: Vec::new(),
        };
        self.visit(target, cutoff, cascade, &mut walk)?;

        tracing::info!(
            "Planned revert of {} touching {} record(s)",
            record,
            walk.records.len()
        );
        Ok(RevertPlan {
            root: record.clone(),
            cutoff,
            records: walk.records,
        })
    }

    fn visit(
        &self,
        target: &VersionEntry,
        cutoff: TransactionId,
        cascade: bool,
        walk: &mut Walk,
    ) -> Result<()> {
        if self.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(VersionError::Cancelled);
        }
        if walk.visits.contains_key(&target.record) {
            return Ok(());
        }
        walk.visits
            .insert(target.record.clone(), VisitState::Resolving);
        walk.records.push(self.resolve(target)?);

        if cascade {
            for edge in self.registry.edges_from(&target.record.record_type) {
                for related in self.related(target, edge, cutoff)? {
                    // Re-entering a record that is still resolving would loop.
                    if walk.visits.get(&related.record) == Some(&VisitState::Resolving) {
                        tracing::trace!("Cycle back to {} short-circuited", related.record);
                        continue;
                    }
                    self.visit(&related, cutoff, cascade, walk)?;
                }
            }
        }

        walk.visits
            .insert(target.record.clone(), VisitState::Reverted);
        Ok(())
    }

    fn resolve(&self, target: &VersionEntry) -> Result<RevertedRecord> {
        let latest = self.state.latest(&target.record).ok_or_else(|| {
            VersionError::UnknownRecord {
                record: target.record.to_string(),
            }
        })?;
        let current = latest.live_state();
        let action = match current {
            Some(_) => RevertAction::Restore,
            None => RevertAction::Resurrect,
        };
        let operation = match action {
            RevertAction::Restore => Operation::Update,
            RevertAction::Resurrect => Operation::Insert,
        };
        let changes = diff_optional(current, Some(&target.snapshot))
            .with_context(target.record.clone(), operation);

        Ok(RevertedRecord {
            record: target.record.clone(),
            action,
            target_version: target.version_number,
            snapshot: target.snapshot.clone(),
            changes,
        })
    }

    /// Versions of the records `edge` reaches from `source`, as of `cutoff`.
    ///
    /// Targets without a live version at the cutoff are skipped.
    fn related(
        &self,
        source: &VersionEntry,
        edge: &RelationshipEdge,
        cutoff: TransactionId,
    ) -> Result<Vec<VersionEntry>> {
        if !self.registry.contains(&edge.target_type) {
            return Err(unresolved(
                source,
                edge,
                format!("target type '{}' is not registered", edge.target_type),
            ));
        }

        let mut found = Vec::new();
        match edge.direction {
            EdgeDirection::Forward => {
                for key in foreign_keys(source, edge)? {
                    let record = RecordId::new(edge.target_type.clone(), key);
                    if !self.state.has_history(&record) {
                        return Err(unresolved(
                            source,
                            edge,
                            format!("{} has no recorded history", record),
                        ));
                    }
                    match self.state.version_at(&record, cutoff)? {
                        Some(entry) if !entry.is_delete() => found.push(VersionEntry::clone(entry)),
                        _ => tracing::debug!("{} absent at {}, left untouched", record, cutoff),
                    }
                }
            }
            EdgeDirection::Inverse => {
                let reference = source.record.key.as_reference();
                for key in self.state.keys_of_type(&edge.target_type) {
                    let record = RecordId::new(edge.target_type.clone(), key.clone());
                    if let Some(entry) = self.state.version_at(&record, cutoff)? {
                        if !entry.is_delete() && entry.snapshot.get(&edge.field) == Some(&reference)
                        {
                            found.push(VersionEntry::clone(entry));
                        }
                    }
                }
            }
        }
        Ok(found)
    }
}

struct Walk {
    visits: HashMap<RecordId, VisitState>,
    records: Vec<RevertedRecord>,
}

/// Reads the key(s) a forward edge points at from the source snapshot.
fn foreign_keys(source: &VersionEntry, edge: &RelationshipEdge) -> Result<Vec<RecordKey>> {
    let value = match source.snapshot.get(&edge.field) {
        None | Some(FieldValue::Null) => return Ok(Vec::new()),
        Some(value) => value,
    };

    let keys = match (edge.cardinality, value) {
        (Cardinality::One, value) => RecordKey::from_reference(value).map(|key| vec![key]),
        (Cardinality::Many, FieldValue::List(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(RecordKey::from_reference)
            .collect::<Option<Vec<_>>>(),
        (Cardinality::Many, _) => None,
    };
    keys.ok_or_else(|| {
        unresolved(
            source,
            edge,
            format!("{:?} reference {} is not a usable key", edge.cardinality, value),
        )
    })
}

fn unresolved(source: &VersionEntry, edge: &RelationshipEdge, reason: String) -> VersionError {
    VersionError::UnresolvedDependency {
        source_record: source.record.to_string(),
        field: edge.field.clone(),
        reason,
    }
}
