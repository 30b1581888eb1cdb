//! On-disk layout of persisted history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::{FieldDef, RecordType, RelationshipEdge};
use crate::transaction::{Operation, TransactionId};
use crate::value::{FieldValue, KeyValue};

/// Current layout version.
pub const FORMAT_VERSION: u32 = 1;

/// Schema file name inside the data directory.
pub const SCHEMA_FILE: &str = "schema.json";

/// Transaction table file name inside the data directory.
pub const TRANSACTIONS_FILE: &str = "transactions.json";

/// Directory holding one versions file per record type.
pub const VERSIONS_DIR: &str = "versions";

/// Relative path of a record type's versions file.
pub fn versions_file(record_type: &str) -> String {
    format!("{}/{}_versions.json", VERSIONS_DIR, record_type)
}

/// `schema.json`: registered types and data file checksums.
#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Layout version
    pub version: u32,
    /// Next transaction id to allocate after reopening
    pub next_transaction_id: u64,
    /// Record types present when the history was written
    pub record_types: BTreeMap<String, RecordTypeSchema>,
    /// CRC32 of each data file, keyed by relative path
    #[serde(default)]
    pub checksums: BTreeMap<String, u32>,
}

/// Persisted description of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeSchema {
    /// Primary key field names, in key order
    pub key_fields: Vec<String>,
    /// Fields, including excluded ones
    pub fields: Vec<FieldDef>,
    /// Outgoing relationship edges
    #[serde(default)]
    pub relationships: Vec<RelationshipEdge>,
}

impl From<&RecordType> for RecordTypeSchema {
    fn from(record_type: &RecordType) -> Self {
        Self {
            key_fields: record_type.key_fields.clone(),
            fields: record_type.fields.clone(),
            relationships: record_type.relationships.clone(),
        }
    }
}

impl RecordTypeSchema {
    /// Turns the persisted description back into a record type.
    pub fn into_record_type(self, name: String) -> RecordType {
        RecordType {
            name,
            key_fields: self.key_fields,
            fields: self.fields,
            relationships: self.relationships,
        }
    }
}

/// `versions/<type>_versions.json`: the shadow table of one record type.
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionsFile {
    /// Record type the rows belong to
    pub record_type: String,
    /// Names of the key columns, in key order
    pub key_fields: Vec<String>,
    /// Names of the snapshot columns
    pub columns: Vec<String>,
    /// Version rows, ordered by key then version number
    pub rows: Vec<VersionRow>,
}

/// One row of a versions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    /// Record key columns
    pub key: Vec<KeyValue>,
    /// Per-record version number
    pub version_number: u64,
    /// Producing transaction
    pub transaction_id: TransactionId,
    /// Operation recorded
    pub operation: Operation,
    /// Snapshot columns; `None` when the field was absent
    pub values: BTreeMap<String, Option<FieldValue>>,
}
