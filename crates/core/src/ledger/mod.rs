//! Durable per-item outcome ledger for batch work.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteLedgerStore;
pub use store::{LedgerError, LedgerStore};
pub use types::{truncate_error, BatchItemState, ItemAnnotation, LedgerRecord, LedgerStatus};
