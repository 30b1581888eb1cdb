//! Relationship edges between record types.

use serde::{Deserialize, Serialize};

/// Number of target records an edge may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// Which side of the edge holds the referencing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// `field` lives on the source and holds the target key(s)
    Forward,
    /// `field` lives on the target and holds the source key
    Inverse,
}

/// Declared directed edge between two record types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Name of the source record type
    pub source_type: String,
    /// Referencing field (see `direction`)
    pub field: String,
    /// Name of the target record type
    pub target_type: String,
    /// One or many targets
    pub cardinality: Cardinality,
    /// Side holding `field`
    pub direction: EdgeDirection,
}

impl RelationshipEdge {
    /// Source holds a single foreign key to the target.
    pub fn one(
        source_type: impl Into<String>,
        field: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            field: field.into(),
            target_type: target_type.into(),
            cardinality: Cardinality::One,
            direction: EdgeDirection::Forward,
        }
    }

    /// Source holds a list of foreign keys to the target.
    pub fn many(
        source_type: impl Into<String>,
        field: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(source_type, field, target_type)
        }
    }

    /// Targets hold a foreign key back to the source (one-to-many children).
    pub fn inverse(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            field: target_field.into(),
            target_type: target_type.into(),
            cardinality: Cardinality::Many,
            direction: EdgeDirection::Inverse,
        }
    }
}
