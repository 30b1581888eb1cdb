//! History persistence: atomic file writes, checksums and load-time
//! validation.


pub mod io_utils;
pub mod persistence_manager;
pub mod schema;
pub mod schema_validation;

pub use persistence_manager::{HistoryPersistence, LoadedHistory};
pub use schema::{SchemaFile, VersionRow, VersionsFile};
