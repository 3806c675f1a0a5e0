use super::{decode_ts, encode_ts, Database};
use crate::metrics;
use crate::sync::{SyncLogEntry, SyncScope};
use crate::Result;
use rusqlite::{params, Row};

/// Filter for reading the audit log, most recent first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: usize,
    pub scope: Option<SyncScope>,
    pub target_id: Option<String>,
}

impl LogQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            scope: None,
            target_id: None,
        }
    }

    pub fn for_target(mut self, scope: SyncScope, target_id: impl Into<String>) -> Self {
        self.scope = Some(scope);
        self.target_id = Some(target_id.into());
        self
    }
}

/// Append-only audit log with bounded retention
#[derive(Clone)]
pub struct LogStore {
    db: Database,
    retention: usize,
}

impl LogStore {
    pub fn new(db: Database, retention: usize) -> Self {
        Self {
            db,
            retention: retention.max(1),
        }
    }

    /// Append an entry; storage failures are reported, never returned
    pub fn append(&self, entry: SyncLogEntry) -> Option<SyncLogEntry> {
        let target = format!("{}:{}", entry.scope, entry.target_id);
        match self.try_append(entry) {
            Ok(stored) => Some(stored),
            Err(e) => {
                metrics::record_log_append_failure();
                tracing::warn!(target_key = %target, error = %e, "Failed to append sync log entry");
                None
            }
        }
    }

    /// Append an entry and prune beyond the retention cap
    pub fn try_append(&self, mut entry: SyncLogEntry) -> Result<SyncLogEntry> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO sync_logs (timestamp, scope, target_id, entity_type, status, message, retry_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                encode_ts(&entry.timestamp),
                entry.scope,
                &entry.target_id,
                entry.entity_type,
                entry.status,
                &entry.message,
                entry.retry_count,
            ],
        )?;
        entry.id = tx.last_insert_rowid();

        let pruned = tx.execute(
            r#"
            DELETE FROM sync_logs WHERE id NOT IN (
                SELECT id FROM sync_logs ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            "#,
            params![self.retention as i64],
        )?;
        tx.commit()?;

        if pruned > 0 {
            tracing::debug!(pruned, retention = self.retention, "Pruned sync log entries");
        }
        Ok(entry)
    }

    pub fn query(&self, query: &LogQuery) -> Result<Vec<SyncLogEntry>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, scope, target_id, entity_type, status, message, retry_count
            FROM sync_logs
            WHERE (?1 IS NULL OR scope = ?1) AND (?2 IS NULL OR target_id = ?2)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![query.scope, query.target_id.as_deref(), query.limit as i64],
            read_entry,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_logs", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let timestamp: String = row.get(1)?;
    Ok(SyncLogEntry {
        id: row.get(0)?,
        timestamp: decode_ts(1, &timestamp)?,
        scope: row.get(2)?,
        target_id: row.get(3)?,
        entity_type: row.get(4)?,
        status: row.get(5)?,
        message: row.get(6)?,
        retry_count: row.get(7)?,
    })
}
