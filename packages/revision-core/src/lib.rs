//! Versioning engine for structured records.
//!
//! Tracks every insert, update and delete made inside a logical
//! transaction, persists each change as an immutable version snapshot,
//! and answers history, diff and revert queries over that history.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod query;
pub mod registry;
pub mod revert;
pub mod store;
pub mod transaction;
pub mod value;

pub use config::{ConflictPolicy, VersioningConfig};
pub use diff::{diff, ChangeSet, FieldChange};
pub use engine::VersioningEngine;
pub use error::{Result, VersionError};
pub use registry::{Cardinality, EdgeDirection, FieldDef, RecordRegistry, RecordType, RelationshipEdge};
pub use revert::{CancelFlag, RevertAction, RevertPlan, RevertedRecord};
pub use store::{VersionEntry, VersionRef, VersionStore};
pub use transaction::{Operation, TransactionGuard, TransactionId, TransactionRecord};
pub use value::{FieldValue, KeyValue, RecordId, RecordKey, Snapshot};
