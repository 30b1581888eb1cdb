//! Saves and loads the full version history.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32fast::Hasher;
use serde::de::DeserializeOwned;

use crate::config::VersioningConfig;
use crate::error::VersionError;
use crate::registry::RecordRegistry;
use crate::store::{HistoryState, VersionEntry, VersionRef};
use crate::transaction::TransactionRecord;
use crate::value::{RecordId, RecordKey, Snapshot};

use super::io_utils::{classify_io_error, retry_io_operation};
use super::schema::{
    versions_file, RecordTypeSchema, SchemaFile, VersionRow, VersionsFile, FORMAT_VERSION,
    SCHEMA_FILE, TRANSACTIONS_FILE, VERSIONS_DIR,
};
use super::schema_validation::{validate_schema, validate_versions_file};

/// History read back from disk.
#[derive(Debug)]
pub struct LoadedHistory {
    /// Rebuilt history
    pub state: HistoryState,
    /// Next transaction id to allocate
    pub next_transaction_id: u64,
}

/// Writes history to a data directory and reads it back.
#[derive(Debug)]
pub struct HistoryPersistence {
    /// Data directory path
    data_dir: PathBuf,
    /// Maximum retry attempts for transient I/O errors
    max_retries: u32,
    /// Delay between retry attempts in milliseconds
    retry_delay_ms: u64,
    /// Serializes concurrent saves
    save_lock: Mutex<()>,
}

impl HistoryPersistence {
    /// Creates a persistence manager for `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>, config: &VersioningConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_retries: config.persistence_max_retries,
            retry_delay_ms: config.persistence_retry_delay_ms,
            save_lock: Mutex::new(()),
        }
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns `true` if a saved history exists.
    pub fn exists(&self) -> bool {
        self.data_dir.join(SCHEMA_FILE).exists()
    }

    /// Saves every transaction and version in `state`.
    ///
    /// Data files are written first and `schema.json` last, so a crash
    /// mid-save leaves checksums that flag the torn files.
    ///
    /// # Arguments
    /// * `registry` - Registered record types
    /// * `state` - History view to save
    /// * `next_transaction_id` - Id the tracker would allocate next
    pub fn save(
        &self,
        registry: &RecordRegistry,
        state: &HistoryState,
        next_transaction_id: u64,
    ) -> Result<(), VersionError> {
        let _guard = self.save_lock.lock().map_err(|_| VersionError::LockPoisoned)?;
        retry_io_operation(
            || self.save_internal(registry, state, next_transaction_id),
            self.max_retries,
            self.retry_delay_ms,
            "save_history",
        )?;
        tracing::info!(
            "Saved {} transaction(s) and {} version(s) to {}",
            state.transaction_count(),
            state.version_count(),
            self.data_dir.display()
        );
        Ok(())
    }

    fn save_internal(
        &self,
        registry: &RecordRegistry,
        state: &HistoryState,
        next_transaction_id: u64,
    ) -> Result<(), VersionError> {
        fs::create_dir_all(self.data_dir.join(VERSIONS_DIR))
            .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;

        let mut checksums = BTreeMap::new();

        let transactions: Vec<&TransactionRecord> = state.transactions().collect();
        let checksum = self.write_json(TRANSACTIONS_FILE, &transactions)?;
        checksums.insert(TRANSACTIONS_FILE.to_string(), checksum);

        let mut by_type: BTreeMap<&str, Vec<&VersionEntry>> = BTreeMap::new();
        for entry in state.all_versions() {
            by_type
                .entry(entry.record.record_type.as_str())
                .or_default()
                .push(&**entry);
        }

        let mut record_types = BTreeMap::new();
        for record_type in registry.iter() {
            let mut entries = by_type.remove(record_type.name.as_str()).unwrap_or_default();
            entries.sort_by(|a, b| {
                (&a.record.key, a.version_number).cmp(&(&b.record.key, b.version_number))
            });

            let columns: Vec<String> = record_type
                .versioned_fields()
                .map(|f| f.name.clone())
                .collect();
            let rows = entries
                .into_iter()
                .map(|entry| to_row(entry, &columns))
                .collect();
            let file = VersionsFile {
                record_type: record_type.name.clone(),
                key_fields: record_type.key_fields.clone(),
                columns,
                rows,
            };

            let path = versions_file(&record_type.name);
            let checksum = self.write_json(&path, &file)?;
            checksums.insert(path, checksum);
            record_types.insert(record_type.name.clone(), RecordTypeSchema::from(record_type));
        }

        if let Some(orphan) = by_type.keys().next() {
            return Err(VersionError::UnknownRecordType {
                record_type: orphan.to_string(),
            });
        }

        let schema = SchemaFile {
            version: FORMAT_VERSION,
            next_transaction_id,
            record_types,
            checksums,
        };
        self.write_json(SCHEMA_FILE, &schema)?;
        Ok(())
    }

    /// Loads a previously saved history.
    ///
    /// # Returns
    /// `Ok(None)` if the directory holds no history yet.
    pub fn load(&self, registry: &RecordRegistry) -> Result<Option<LoadedHistory>, VersionError> {
        if !self.exists() {
            tracing::debug!("No saved history in {}", self.data_dir.display());
            return Ok(None);
        }

        let schema: SchemaFile = parse(&self.read_file(SCHEMA_FILE)?, SCHEMA_FILE)?;
        validate_schema(&schema, registry)?;

        let bytes = self.read_verified(TRANSACTIONS_FILE, &schema)?;
        let transactions: Vec<TransactionRecord> = parse(&bytes, TRANSACTIONS_FILE)?;

        let mut entries = Vec::new();
        for record_type in schema.record_types.keys() {
            let path = versions_file(record_type);
            let bytes = self.read_verified(&path, &schema)?;
            let file: VersionsFile = parse(&bytes, &path)?;
            validate_versions_file(&file, record_type, &schema)?;
            entries.extend(file.rows.into_iter().map(|row| from_row(record_type, row)));
        }

        let state = HistoryState::rebuild(transactions, entries)?;
        let next_transaction_id = state
            .max_transaction_id()
            .map_or(1, |id| id.as_u64() + 1)
            .max(schema.next_transaction_id);

        tracing::info!(
            "Loaded {} transaction(s) and {} version(s) from {}",
            state.transaction_count(),
            state.version_count(),
            self.data_dir.display()
        );
        Ok(Some(LoadedHistory {
            state,
            next_transaction_id,
        }))
    }

    /// Rebuilds the registry recorded in `schema.json`.
    ///
    /// Lets tools inspect a history without the host's type definitions.
    /// Returns `Ok(None)` if the directory holds no history yet.
    pub fn load_registry(&self) -> Result<Option<RecordRegistry>, VersionError> {
        if !self.exists() {
            return Ok(None);
        }
        let schema: SchemaFile = parse(&self.read_file(SCHEMA_FILE)?, SCHEMA_FILE)?;
        let types = schema
            .record_types
            .into_iter()
            .map(|(name, persisted)| persisted.into_record_type(name));
        RecordRegistry::from_types(types)
            .map(Some)
            .map_err(|e| VersionError::DataCorruption(format!("Invalid persisted schema: {}", e)))
    }

    /// Writes `value` as JSON through a temp file and atomic rename.
    ///
    /// # Returns
    /// CRC32 of the bytes written.
    fn write_json<T: serde::Serialize + ?Sized>(
        &self,
        relative: &str,
        value: &T,
    ) -> Result<u32, VersionError> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| VersionError::SerializationError(e.to_string()))?;

        let final_path = self.data_dir.join(relative);
        let temp_path = self.data_dir.join(format!("{}.tmp", relative));

        let mut file = File::create(&temp_path)
            .map_err(|e| classify_io_error(e, "Failed to create temp file"))?;
        file.write_all(&json)
            .map_err(|e| classify_io_error(e, "Failed to write history file"))?;
        file.sync_all()
            .map_err(|e| classify_io_error(e, "Failed to sync history file"))?;
        fs::rename(&temp_path, &final_path)
            .map_err(|e| classify_io_error(e, "Failed to rename history file"))?;

        Ok(checksum(&json))
    }

    fn read_file(&self, relative: &str) -> Result<Vec<u8>, VersionError> {
        let mut file = File::open(self.data_dir.join(relative))
            .map_err(|e| classify_io_error(e, "Failed to open history file"))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| classify_io_error(e, "Failed to read history file"))?;
        Ok(data)
    }

    /// Reads a data file and checks it against the recorded checksum.
    fn read_verified(&self, relative: &str, schema: &SchemaFile) -> Result<Vec<u8>, VersionError> {
        let expected = schema.checksums.get(relative).ok_or_else(|| {
            VersionError::DataCorruption(format!("No checksum recorded for '{}'", relative))
        })?;
        let data = self.read_file(relative)?;
        let actual = checksum(&data);
        if actual != *expected {
            return Err(VersionError::DataCorruption(format!(
                "Checksum mismatch for '{}': expected {:08x}, got {:08x}",
                relative, expected, actual
            )));
        }
        Ok(data)
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn parse<T: DeserializeOwned>(data: &[u8], name: &str) -> Result<T, VersionError> {
    serde_json::from_slice(data)
        .map_err(|e| VersionError::SerializationError(format!("Failed to parse {}: {}", name, e)))
}

fn to_row(entry: &VersionEntry, columns: &[String]) -> VersionRow {
    VersionRow {
        key: entry.record.key.parts().to_vec(),
        version_number: entry.version_number,
        transaction_id: entry.transaction_id,
        operation: entry.operation,
        values: columns
            .iter()
            .map(|name| (name.clone(), entry.snapshot.get(name).cloned()))
            .collect(),
    }
}

fn from_row(record_type: &str, row: VersionRow) -> VersionEntry {
    let record = RecordId::new(record_type, RecordKey(row.key));
    let snapshot: Snapshot = row
        .values
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect();
    let previous = (row.version_number > 1).then(|| VersionRef {
        record: record.clone(),
        version_number: row.version_number - 1,
    });
    VersionEntry {
        record,
        transaction_id: row.transaction_id,
        version_number: row.version_number,
        operation: row.operation,
        snapshot,
        previous,
    }
}
