//! Recently completed downloads.

mod sqlite_store;

pub use sqlite_store::{HistoryEntry, HistoryError, HistoryStore, SqliteHistoryStore, HISTORY_LIMIT};
