//! Record type and relationship validation.

use std::collections::{HashMap, HashSet};

use crate::error::VersionError;

use super::record_type::RecordType;
use super::relationship::EdgeDirection;

/// Validates a single record type in isolation.
pub(crate) fn validate_record_type(record_type: &RecordType) -> Result<(), VersionError> {
    if record_type.name.is_empty() {
        return Err(VersionError::RegistryError(
            "record type name must not be empty".to_string(),
        ));
    }

    if record_type.key_fields.is_empty() {
        return Err(VersionError::RegistryError(format!(
            "record type '{}' declares no key fields",
            record_type.name
        )));
    }

    let mut seen = HashSet::new();
    for field in &record_type.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(VersionError::RegistryError(format!(
                "duplicate field '{}' in record type '{}'",
                field.name, record_type.name
            )));
        }
    }

    for key in &record_type.key_fields {
        if !record_type.is_versioned_field(key) {
            return Err(VersionError::RegistryError(format!(
                "key field '{}' of record type '{}' must be a versioned field",
                key, record_type.name
            )));
        }
    }

    for edge in &record_type.relationships {
        if edge.source_type != record_type.name {
            return Err(VersionError::RegistryError(format!(
                "relationship on '{}' declares source type '{}'",
                record_type.name, edge.source_type
            )));
        }
        if edge.direction == EdgeDirection::Forward && !record_type.is_versioned_field(&edge.field)
        {
            return Err(VersionError::RegistryError(format!(
                "relationship field '{}' is not a versioned field of '{}'",
                edge.field, record_type.name
            )));
        }
    }

    Ok(())
}

/// Validates cross-type references once every type is known.
pub(crate) fn validate_relationships(
    types: &HashMap<String, RecordType>,
) -> Result<(), VersionError> {
    for record_type in types.values() {
        for edge in &record_type.relationships {
            let target = types.get(&edge.target_type).ok_or_else(|| {
                VersionError::RegistryError(format!(
                    "relationship '{}.{}' targets unregistered type '{}'",
                    edge.source_type, edge.field, edge.target_type
                ))
            })?;

            if edge.direction == EdgeDirection::Inverse && !target.is_versioned_field(&edge.field) {
                return Err(VersionError::RegistryError(format!(
                    "inverse relationship field '{}' is not a versioned field of '{}'",
                    edge.field, target.name
                )));
            }
        }
    }
    Ok(())
}
