//! SQLite-backed ledger store implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{LedgerError, LedgerRecord, LedgerStatus, LedgerStore};

/// SQLite-backed ledger store.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger in the database file at `path`.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        // Ledger, history and settings share the file through separate connections.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                batch_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                title TEXT NOT NULL,
                output_path TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                url TEXT NOT NULL,
                error TEXT,
                request TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (batch_id, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_status ON ledger(batch_id, status);
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LedgerRecord> {
        let status_str: String = row.get(4)?;
        let updated_at_str: String = row.get(8)?;

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(LedgerRecord {
            batch_id: row.get(0)?,
            item_id: row.get(1)?,
            title: row.get(2)?,
            output_path: row.get(3)?,
            // Unknown statuses are treated as needing another attempt.
            status: LedgerStatus::parse(&status_str).unwrap_or(LedgerStatus::Missing),
            url: row.get(5)?,
            error: row.get(6)?,
            request: row.get(7)?,
            updated_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "batch_id, item_id, title, output_path, status, url, error, request, updated_at";

impl LedgerStore for SqliteLedgerStore {
    fn upsert(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO ledger (batch_id, item_id, title, output_path, status, url, error, request, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(batch_id, item_id) DO UPDATE SET
                title = excluded.title,
                output_path = excluded.output_path,
                status = excluded.status,
                url = excluded.url,
                error = excluded.error,
                request = COALESCE(excluded.request, ledger.request),
                updated_at = excluded.updated_at
            "#,
            params![
                record.batch_id,
                record.item_id,
                record.title,
                record.output_path,
                record.status.as_str(),
                record.url,
                record.error,
                record.request,
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }

    fn downloaded_ids(&self, batch_id: &str) -> Result<HashSet<String>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT item_id FROM ledger WHERE batch_id = ?1 AND status = ?2")
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let ids = stmt
            .query_map(
                params![batch_id, LedgerStatus::Downloaded.as_str()],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(ids)
    }

    fn mark_missing(&self, batch_id: &str, item_id: &str) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE ledger SET status = ?1, updated_at = ?2 WHERE batch_id = ?3 AND item_id = ?4",
                params![
                    LedgerStatus::Missing.as_str(),
                    Utc::now().to_rfc3339(),
                    batch_id,
                    item_id
                ],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(LedgerError::not_found(batch_id, item_id));
        }
        Ok(())
    }

    fn get(&self, batch_id: &str, item_id: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM ledger WHERE batch_id = ?1 AND item_id = ?2",
                SELECT_COLUMNS
            ),
            params![batch_id, item_id],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| LedgerError::Database(e.to_string()))
    }

    fn list(&self, batch_id: &str) -> Result<Vec<LedgerRecord>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM ledger WHERE batch_id = ?1 ORDER BY updated_at DESC",
                SELECT_COLUMNS
            ))
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let records = stmt
            .query_map(params![batch_id], Self::row_to_record)
            .map_err(|e| LedgerError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(records)
    }

    fn clear_batch(&self, batch_id: &str) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM ledger WHERE batch_id = ?1", params![batch_id])
            .map_err(|e| LedgerError::Database(e.to_string()))
    }
}
