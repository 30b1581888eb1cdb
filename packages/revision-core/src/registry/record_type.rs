//! Versioned record type description.

use serde::{Deserialize, Serialize};

use crate::value::{RecordKey, Snapshot};

use super::field::FieldDef;
use super::relationship::RelationshipEdge;

/// Registered description of a versioned record type.
///
/// Replaces runtime model reflection: every type declares its key, its
/// fields and its outgoing relationship edges once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    /// Type name (e.g. "article")
    pub name: String,
    /// Primary key field names, in key order
    pub key_fields: Vec<String>,
    /// Field definitions in declaration order
    pub fields: Vec<FieldDef>,
    /// Outgoing relationship edges
    pub relationships: Vec<RelationshipEdge>,
}

impl RecordType {
    /// Creates a record type keyed by the given fields.
    ///
    /// Key fields are declared as persisted fields automatically.
    pub fn new<I, S>(name: impl Into<String>, key_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_fields: Vec<String> = key_fields.into_iter().map(Into::into).collect();
        let fields = key_fields.iter().cloned().map(FieldDef::persisted).collect();
        Self {
            name: name.into(),
            key_fields,
            fields,
            relationships: Vec::new(),
        }
    }

    /// Adds a versioned field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::persisted(name));
        self
    }

    /// Adds a field that is never versioned.
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::excluded(name));
        self
    }

    /// Adds an outgoing relationship edge.
    pub fn relationship(mut self, edge: RelationshipEdge) -> Self {
        self.relationships.push(edge);
        self
    }

    /// Returns the versioned field definitions.
    pub fn versioned_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.versioned)
    }

    /// Returns whether `name` is a versioned field of this type.
    pub fn is_versioned_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.versioned && f.name == name)
    }

    /// Restricts an image to the versioned fields.
    ///
    /// Undeclared and excluded fields are dropped; declared fields missing
    /// from the image stay absent.
    pub fn project(&self, image: &Snapshot) -> Snapshot {
        image
            .iter()
            .filter(|(name, _)| self.is_versioned_field(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Extracts the primary key from an image.
    pub fn key_of(&self, image: &Snapshot) -> Option<RecordKey> {
        RecordKey::from_snapshot(image, &self.key_fields)
    }
}
