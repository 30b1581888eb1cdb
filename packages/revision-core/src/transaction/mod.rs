//! Transaction tracking, change collection and staging.

mod change;
mod collector;
mod record_locks;
mod staging_buffer;
mod tracker;
#[allow(clippy::module_inception)]
mod transaction;
mod transaction_handle;

pub use change::{ChangeOutcome, Operation, StagedChange};
pub use collector::ChangeCollector;
pub use record_locks::RecordLocks;
pub use staging_buffer::StagingBuffer;
pub use tracker::{FinalizedTransaction, TransactionTracker};
pub use transaction::{ActiveTransaction, TransactionId, TransactionRecord, TransactionState};
pub use transaction_handle::TransactionGuard;
