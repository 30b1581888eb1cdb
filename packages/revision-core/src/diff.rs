//! Field-level diff between two snapshots.
//!
//! The field set is the union of both snapshots' keys. A field present on
//! one side only is reported with the other side absent (`None`), which is
//! distinct from a `FieldValue::Null` value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transaction::Operation;
use crate::value::{FieldValue, RecordId, Snapshot};

/// Old and new value of a single changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Value before the change, `None` if the field was absent
    pub old: Option<FieldValue>,
    /// Value after the change, `None` if the field is absent
    pub new: Option<FieldValue>,
}

impl FieldChange {
    /// Returns the same change seen from the other direction.
    pub fn inverted(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }

    /// Field did not exist before.
    pub fn is_added(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    /// Field no longer exists.
    pub fn is_removed(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }
}

/// Set of field changes, optionally attributed to a record and operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Record the changes belong to, if known
    pub record: Option<RecordId>,
    /// Operation that produced the changes, if known
    pub operation: Option<Operation>,
    /// Changed fields keyed by name
    pub changed_fields: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
    /// Attributes the change set to a record and operation.
    pub fn with_context(mut self, record: RecordId, operation: Operation) -> Self {
        self.record = Some(record);
        self.operation = Some(operation);
        self
    }

    /// Returns `true` if no field changed.
    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty()
    }

    /// Returns the number of changed fields.
    pub fn len(&self) -> usize {
        self.changed_fields.len()
    }

    /// Returns the change for a field, if it changed.
    pub fn field(&self, name: &str) -> Option<&FieldChange> {
        self.changed_fields.get(name)
    }

    /// Returns the changed field names in sorted order.
    pub fn field_names(&self) -> Vec<&str> {
        self.changed_fields.keys().map(String::as_str).collect()
    }

    /// Returns the same change set with old and new swapped.
    pub fn inverted(&self) -> Self {
        Self {
            record: self.record.clone(),
            operation: self.operation,
            changed_fields: self
                .changed_fields
                .iter()
                .map(|(name, change)| (name.clone(), change.inverted()))
                .collect(),
        }
    }

    /// Applies the new side of every change onto `base`.
    pub fn apply_to(&self, base: &Snapshot) -> Snapshot {
        let mut result = base.clone();
        for (name, change) in &self.changed_fields {
            match &change.new {
                Some(value) => {
                    result.insert(name.clone(), value.clone());
                }
                None => {
                    result.remove(name);
                }
            }
        }
        result
    }
}

/// Computes the field-level changes that turn `a` into `b`.
///
/// Pure: depends only on its arguments.
pub fn diff(a: &Snapshot, b: &Snapshot) -> ChangeSet {
    let mut changed_fields = BTreeMap::new();

    for (name, old) in a {
        match b.get(name) {
            Some(new) if new == old => {}
            new => {
                changed_fields.insert(
                    name.clone(),
                    FieldChange {
                        old: Some(old.clone()),
                        new: new.cloned(),
                    },
                );
            }
        }
    }

    for (name, new) in b {
        if !a.contains_key(name) {
            changed_fields.insert(
                name.clone(),
                FieldChange {
                    old: None,
                    new: Some(new.clone()),
                },
            );
        }
    }

    ChangeSet {
        record: None,
        operation: None,
        changed_fields,
    }
}

/// Diff against an optional side; a missing snapshot counts as empty.
pub fn diff_optional(a: Option<&Snapshot>, b: Option<&Snapshot>) -> ChangeSet {
    let empty = Snapshot::new();
    diff(a.unwrap_or(&empty), b.unwrap_or(&empty))
}
