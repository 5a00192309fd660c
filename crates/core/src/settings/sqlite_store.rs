//! Key/value settings table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// Error type for settings operations.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Application settings that survive restarts.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;

    /// Returns true if the key existed.
    fn delete(&self, key: &str) -> Result<bool, SettingsError>;

    fn all(&self) -> Result<HashMap<String, String>, SettingsError>;
}

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    pub fn new(path: &Path) -> Result<Self, SettingsError> {
        let conn = Connection::open(path).map_err(|e| SettingsError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        // Ledger, history and settings share the file through separate connections.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SettingsError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SettingsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SettingsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| SettingsError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SettingsError> {
        self.conn
            .lock()
            .map_err(|e| SettingsError::Database(format!("connection lock poisoned: {}", e)))
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| SettingsError::Database(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| SettingsError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, SettingsError> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        Ok(removed > 0)
    }

    fn all(&self) -> Result<HashMap<String, String>, SettingsError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings")
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| SettingsError::Database(e.to_string()))?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert_eq!(store.get("theme").unwrap(), None);
        store.set("theme", "dark").unwrap();
        store.set("theme", "light").unwrap();
        assert_eq!(store.get("theme").unwrap().as_deref(), Some("light"));
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set("k", "v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        SqliteSettingsStore::new(&path)
            .unwrap()
            .set("download_dir", "/music")
            .unwrap();
        let reopened = SqliteSettingsStore::new(&path).unwrap();
        assert_eq!(
            reopened.get("download_dir").unwrap().as_deref(),
            Some("/music")
        );
    }
}
