//! SQLite-backed download history capped at [`HISTORY_LIMIT`] entries.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::MediaMode;

/// Entries kept; older ones are dropped on insert.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(String),
}

/// One completed download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub file: String,
    pub quality: String,
    pub mode: MediaMode,
    pub original_url: String,
    pub timestamp: DateTime<Utc>,
}

pub trait HistoryStore: Send + Sync {
    fn add(&self, entry: &HistoryEntry) -> Result<(), HistoryError>;

    /// Newest first.
    fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError>;

    fn clear(&self) -> Result<(), HistoryError>;
}

pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        // Ledger, history and settings share the file through separate connections.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| HistoryError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn
            .lock()
            .map_err(|e| HistoryError::Database(format!("connection lock poisoned: {}", e)))
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn add(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let json =
            serde_json::to_string(entry).map_err(|e| HistoryError::Database(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO history (entry, created_at) VALUES (?1, ?2)",
            params![json, entry.timestamp.to_rfc3339()],
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;
        conn.execute(
            "DELETE FROM history WHERE id NOT IN (SELECT id FROM history ORDER BY id DESC LIMIT ?1)",
            params![HISTORY_LIMIT as i64],
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT entry FROM history ORDER BY id DESC")
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| HistoryError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        // Rows that no longer deserialize are skipped rather than failing the list.
        Ok(rows
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }

    fn clear(&self) -> Result<(), HistoryError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM history", [])
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> HistoryEntry {
        HistoryEntry {
            title: title.to_string(),
            artist: None,
            thumbnail: None,
            file: format!("{}.mp3", title),
            quality: "high".to_string(),
            mode: MediaMode::Audio,
            original_url: "https://example.com".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_list_newest_first() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.add(&entry("first")).unwrap();
        store.add(&entry("second")).unwrap();
        let list = store.list().unwrap();
        assert_eq!(list[0].title, "second");
        assert_eq!(list[1].title, "first");
    }

    #[test]
    fn test_capped_at_limit() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        for i in 0..(HISTORY_LIMIT + 5) {
            store.add(&entry(&format!("song-{}", i))).unwrap();
        }
        let list = store.list().unwrap();
        assert_eq!(list.len(), HISTORY_LIMIT);
        assert_eq!(list[0].title, format!("song-{}", HISTORY_LIMIT + 4));
        assert_eq!(list.last().unwrap().title, "song-5");
    }

    #[test]
    fn test_clear() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.add(&entry("a")).unwrap();
        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
