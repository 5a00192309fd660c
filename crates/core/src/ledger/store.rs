//! Ledger storage trait.

use std::collections::HashSet;

use thiserror::Error;

use super::types::LedgerRecord;

/// Error type for ledger operations.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Ledger record not found: {batch_id}/{item_id}")]
    NotFound { batch_id: String, item_id: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    pub fn not_found(batch_id: &str, item_id: &str) -> Self {
        Self::NotFound {
            batch_id: batch_id.to_string(),
            item_id: item_id.to_string(),
        }
    }
}

/// Durable store of batch item outcomes keyed by `(batch_id, item_id)`.
///
/// Writes for the same key serialize; the last write wins.
pub trait LedgerStore: Send + Sync {
    /// Insert or replace the record for its key.
    fn upsert(&self, record: &LedgerRecord) -> Result<(), LedgerError>;

    /// Item ids whose latest status is `downloaded`.
    fn downloaded_ids(&self, batch_id: &str) -> Result<HashSet<String>, LedgerError>;

    /// Flip an existing record to `missing` so it is attempted again.
    fn mark_missing(&self, batch_id: &str, item_id: &str) -> Result<(), LedgerError>;

    fn get(&self, batch_id: &str, item_id: &str) -> Result<Option<LedgerRecord>, LedgerError>;

    /// All records of a batch, most recently updated first.
    fn list(&self, batch_id: &str) -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Remove every record of a batch. Returns how many were removed.
    fn clear_batch(&self, batch_id: &str) -> Result<usize, LedgerError>;
}
