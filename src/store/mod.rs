//! SQLite persistence for sync configs and audit logs
//!
//! Both stores share one connection behind a mutex. Writes are short and never
//! held across network calls.

mod configs;
mod logs;

pub use configs::ConfigStore;
pub use logs::{LogQuery, LogStore};

use crate::sync::{EntityType, LogStatus, SyncScope, SyncStatus};
use crate::{AtsSyncError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared SQLite handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database file
    pub fn open(path: &Path, wal_mode: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Opening sync database");

        let conn = Connection::open(path)?;
        if wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AtsSyncError::Storage("database connection lock poisoned".to_string()))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sync_configs (
            scope TEXT NOT NULL,
            target_id TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            last_status TEXT NOT NULL,
            last_synced_at TEXT,
            last_attempted_at TEXT,
            retries INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL,
            explicit INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (scope, target_id)
        );

        CREATE TABLE IF NOT EXISTS sync_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            scope TEXT NOT NULL,
            target_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            retry_count INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sync_logs_recent ON sync_logs(timestamp DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_sync_logs_target ON sync_logs(scope, target_id);
        "#,
    )?;

    Ok(())
}

/// Fixed-width UTC text so lexical order matches time order
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn decode_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| decode_ts(idx, &s)).transpose()
}

macro_rules! text_column {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: AtsSyncError| FromSqlError::Other(Box::new(e)))
                }
            }
        )*
    };
}

text_column!(SyncScope, SyncStatus, LogStatus, EntityType);
