//! Field definition within a record type.

use serde::{Deserialize, Serialize};

/// Field definition within a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Whether the field is captured in version snapshots
    pub versioned: bool,
}

impl FieldDef {
    /// Creates a persisted field that participates in versioning.
    pub fn persisted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versioned: true,
        }
    }

    /// Creates a field excluded from versioning (derived or volatile data).
    pub fn excluded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versioned: false,
        }
    }
}
