//! Version store and history views.

mod history;
mod version;
mod version_store;

pub use history::{CommitBatch, HistoryState};
pub use version::{VersionEntry, VersionRef};
pub use version_store::VersionStore;
