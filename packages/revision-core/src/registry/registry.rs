use std::collections::HashMap;

use crate::error::VersionError;

use super::record_type::RecordType;
use super::relationship::RelationshipEdge;
use super::validation;

/// Registry of versioned record types.
///
/// Populated once at process start, then shared read-only behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct RecordRegistry {
    types: HashMap<String, RecordType>,
}

impl RecordRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registers a record type.
    ///
    /// # Arguments
    /// * `record_type` - Type description to register
    ///
    /// # Returns
    /// `Ok(())` if successful, `Err(VersionError)` if already registered or invalid.
    pub fn register(&mut self, record_type: RecordType) -> Result<(), VersionError> {
        validation::validate_record_type(&record_type)?;

        if self.types.contains_key(&record_type.name) {
            return Err(VersionError::RegistryError(format!(
                "record type '{}' already registered",
                record_type.name
            )));
        }

        tracing::debug!(
            "Registered record type {} ({} fields, {} relationships)",
            record_type.name,
            record_type.fields.len(),
            record_type.relationships.len()
        );
        self.types.insert(record_type.name.clone(), record_type);
        Ok(())
    }

    /// Builds a registry from a set of types and validates cross references.
    pub fn from_types<I>(types: I) -> Result<Self, VersionError>
    where
        I: IntoIterator<Item = RecordType>,
    {
        let mut registry = Self::new();
        for record_type in types {
            registry.register(record_type)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Validates that every relationship targets a registered type.
    pub fn validate(&self) -> Result<(), VersionError> {
        validation::validate_relationships(&self.types)
    }

    /// Retrieves a record type by name.
    pub fn get(&self, name: &str) -> Option<&RecordType> {
        self.types.get(name)
    }

    /// Retrieves a record type by name or fails with `UnknownRecordType`.
    pub fn require(&self, name: &str) -> Result<&RecordType, VersionError> {
        self.get(name).ok_or_else(|| VersionError::UnknownRecordType {
            record_type: name.to_string(),
        })
    }

    /// Checks if a type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Returns all registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the outgoing edges of a type (empty if unknown).
    pub fn edges_from(&self, name: &str) -> &[RelationshipEdge] {
        self.types
            .get(name)
            .map(|t| t.relationships.as_slice())
            .unwrap_or(&[])
    }

    /// Iterates over all registered types.
    pub fn iter(&self) -> impl Iterator<Item = &RecordType> {
        self.types.values()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
