//! Consistency checks for loaded history files.

use std::collections::HashSet;

use crate::error::VersionError;
use crate::registry::RecordRegistry;

use super::schema::{versions_file, SchemaFile, VersionsFile, FORMAT_VERSION, TRANSACTIONS_FILE};

/// Checks a loaded schema against the running registry.
///
/// # Arguments
/// * `schema` - Parsed `schema.json`
/// * `registry` - Record types registered at startup
///
/// # Returns
/// `DataCorruption` when the schema cannot belong to this registry.
pub fn validate_schema(schema: &SchemaFile, registry: &RecordRegistry) -> Result<(), VersionError> {
    if schema.version != FORMAT_VERSION {
        return Err(VersionError::SerializationError(format!(
            "Unsupported history format version: {}",
            schema.version
        )));
    }

    for (name, persisted) in &schema.record_types {
        let Some(registered) = registry.get(name) else {
            return Err(VersionError::DataCorruption(format!(
                "History contains unregistered record type '{}'",
                name
            )));
        };
        if registered.key_fields != persisted.key_fields {
            return Err(VersionError::DataCorruption(format!(
                "Key fields of '{}' changed from {:?} to {:?}",
                name, persisted.key_fields, registered.key_fields
            )));
        }

        let mut seen = HashSet::new();
        for field in &persisted.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(VersionError::DataCorruption(format!(
                    "Duplicate field '{}' in persisted type '{}'",
                    field.name, name
                )));
            }
        }
    }

    for file in schema.checksums.keys() {
        let known = file == TRANSACTIONS_FILE
            || schema
                .record_types
                .keys()
                .any(|name| versions_file(name) == *file);
        if !known {
            return Err(VersionError::DataCorruption(format!(
                "Checksum recorded for unexpected file '{}'",
                file
            )));
        }
    }

    Ok(())
}

/// Checks that a versions file matches the type it is stored under.
pub fn validate_versions_file(
    file: &VersionsFile,
    record_type: &str,
    schema: &SchemaFile,
) -> Result<(), VersionError> {
    if file.record_type != record_type {
        return Err(VersionError::DataCorruption(format!(
            "Versions file for '{}' holds rows of '{}'",
            record_type, file.record_type
        )));
    }

    let expected = schema
        .record_types
        .get(record_type)
        .map(|t| &t.key_fields)
        .ok_or_else(|| {
            VersionError::DataCorruption(format!("No schema entry for '{}'", record_type))
        })?;
    if &file.key_fields != expected {
        return Err(VersionError::DataCorruption(format!(
            "Versions file for '{}' has key columns {:?}, schema says {:?}",
            record_type, file.key_fields, expected
        )));
    }

    for row in &file.rows {
        if row.key.len() != file.key_fields.len() {
            return Err(VersionError::DataCorruption(format!(
                "Row of '{}' version {} has {} key values, expected {}",
                record_type,
                row.version_number,
                row.key.len(),
                file.key_fields.len()
            )));
        }
        if row.version_number == 0 {
            return Err(VersionError::DataCorruption(format!(
                "Row of '{}' has version number 0",
                record_type
            )));
        }
    }
    Ok(())
}
