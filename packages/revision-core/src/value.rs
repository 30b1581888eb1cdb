//! Field values, record keys and snapshots.
//!
//! A snapshot is the full field-value map of a record at one version.
//! Field order is canonical (sorted by name) so snapshots compare and
//! serialize deterministically.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full field-value map of a record.
pub type Snapshot = BTreeMap<String, FieldValue>;

/// A single field value.
///
/// Equality is exact: floats compare by bit pattern, so an identical `NaN`
/// is equal to itself and `0.0` differs from `-0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Returns `true` for `FieldValue::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::List(_) => "list",
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::List(a), FieldValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "'{}'", v),
            FieldValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            FieldValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<KeyValue> for FieldValue {
    fn from(v: KeyValue) -> Self {
        match v {
            KeyValue::Int(i) => FieldValue::Int(i),
            KeyValue::Text(s) => FieldValue::Text(s),
        }
    }
}

/// One component of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Converts a field value into a key component if its shape allows it.
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(KeyValue::Int(*v)),
            FieldValue::Text(v) => Some(KeyValue::Text(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

/// Stable primary key tuple of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(pub Vec<KeyValue>);

impl RecordKey {
    /// Creates a single-column key.
    pub fn single(value: impl Into<KeyValue>) -> Self {
        RecordKey(vec![value.into()])
    }

    /// Extracts the key from a snapshot given the key field names.
    ///
    /// Returns `None` if a key field is missing or has a non-key shape.
    pub fn from_snapshot(snapshot: &Snapshot, key_fields: &[String]) -> Option<Self> {
        key_fields
            .iter()
            .map(|name| snapshot.get(name).and_then(KeyValue::from_field))
            .collect::<Option<Vec<_>>>()
            .map(RecordKey)
    }

    /// Builds a key from a foreign-key field value.
    ///
    /// A scalar yields a single-column key, a list yields a composite key.
    pub fn from_reference(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::List(parts) => parts
                .iter()
                .map(KeyValue::from_field)
                .collect::<Option<Vec<_>>>()
                .map(RecordKey),
            other => KeyValue::from_field(other).map(|k| RecordKey(vec![k])),
        }
    }

    /// Returns the key components.
    pub fn parts(&self) -> &[KeyValue] {
        &self.0
    }

    /// Returns the key as a field value suitable for comparison with a
    /// foreign-key column.
    pub fn as_reference(&self) -> FieldValue {
        match self.0.as_slice() {
            [single] => FieldValue::from(single.clone()),
            parts => FieldValue::List(parts.iter().cloned().map(FieldValue::from).collect()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

/// Identifies a record across all registered types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// Registered record type name
    pub record_type: String,
    /// Primary key within that type
    pub key: RecordKey,
}

impl RecordId {
    /// Creates a new record identifier.
    pub fn new(record_type: impl Into<String>, key: RecordKey) -> Self {
        Self {
            record_type: record_type.into(),
            key,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.record_type, self.key)
    }
}
