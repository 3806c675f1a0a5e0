use super::{decode_opt_ts, decode_ts, encode_ts, Database};
use crate::sync::{SyncConfig, SyncScope, TargetKey};
use crate::{AtsSyncError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "scope, target_id, enabled, last_status, last_synced_at, \
     last_attempted_at, retries, error, updated_at, version, explicit";

/// Persistent `SyncConfig` records keyed by `(scope, target_id)`
#[derive(Clone)]
pub struct ConfigStore {
    db: Database,
}

impl ConfigStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get(&self, scope: SyncScope, target_id: &str) -> Result<Option<SyncConfig>> {
        let conn = self.db.lock()?;
        load(&conn, scope, target_id)
    }

    pub fn find(&self, key: &TargetKey) -> Result<Option<SyncConfig>> {
        self.get(key.scope, &key.target_id)
    }

    /// Organization and job records read under one lock
    pub fn pair(
        &self,
        organization_id: &str,
        job_id: Option<&str>,
    ) -> Result<(Option<SyncConfig>, Option<SyncConfig>)> {
        let conn = self.db.lock()?;
        let org = load(&conn, SyncScope::Organization, organization_id)?;
        let job = match job_id {
            Some(id) => load(&conn, SyncScope::Job, id)?,
            None => None,
        };
        Ok((org, job))
    }

    /// All records, optionally filtered by scope, ordered by `(scope, target_id)`
    pub fn list(&self, scope: Option<SyncScope>) -> Result<Vec<SyncConfig>> {
        let conn = self.db.lock()?;
        let configs = match scope {
            Some(scope) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_configs WHERE scope = ?1 ORDER BY scope, target_id",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![scope], read_config)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_configs ORDER BY scope, target_id",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt.query_map([], read_config)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(configs)
    }

    /// Operator toggle; creates the record on first use
    pub fn upsert(&self, scope: SyncScope, target_id: &str, enabled: bool) -> Result<SyncConfig> {
        self.upsert_checked(scope, target_id, enabled, None)
    }

    /// Toggle that fails with `Conflict` when the stored version is not `expected_version`.
    ///
    /// A missing record has version 0.
    pub fn upsert_checked(
        &self,
        scope: SyncScope,
        target_id: &str,
        enabled: bool,
        expected_version: Option<u64>,
    ) -> Result<SyncConfig> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let current = load(&tx, scope, target_id)?;
        if let Some(expected) = expected_version {
            let actual = current.as_ref().map_or(0, |c| c.version);
            if actual != expected {
                return Err(AtsSyncError::Conflict {
                    target: TargetKey::new(scope, target_id).to_string(),
                    expected,
                    actual,
                });
            }
        }

        let mut config = match current {
            Some(mut existing) => {
                existing.apply_toggle(enabled);
                existing.explicit = true;
                existing
            }
            None => SyncConfig::new(scope, target_id, enabled),
        };
        config.updated_at = Utc::now();
        config.version += 1;

        store(&tx, &config)?;
        tx.commit()?;

        tracing::info!(
            scope = %scope,
            target_id = target_id,
            enabled = enabled,
            version = config.version,
            "Sync config updated"
        );
        Ok(config)
    }

    /// Status record for a target that inherits its toggle.
    ///
    /// Created on the first sync attempt. An existing status-only record has
    /// its `enabled` brought in line with `inherited`; an explicit record is
    /// returned untouched.
    pub(crate) fn inherit(&self, key: &TargetKey, inherited: bool) -> Result<SyncConfig> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let mut config = match load(&tx, key.scope, &key.target_id)? {
            Some(existing) if existing.explicit || existing.enabled == inherited => {
                return Ok(existing)
            }
            Some(mut existing) => {
                existing.apply_toggle(inherited);
                existing
            }
            None => SyncConfig::inherited(key.scope, key.target_id.clone(), inherited),
        };
        config.updated_at = Utc::now();
        config.version += 1;

        store(&tx, &config)?;
        tx.commit()?;

        tracing::debug!(target_key = %key, enabled = inherited, "Inherited sync status record written");
        Ok(config)
    }

    /// Transactional read-modify-write of an existing record.
    ///
    /// Returns `None` without writing when the record does not exist.
    pub(crate) fn update<F>(&self, key: &TargetKey, apply: F) -> Result<Option<SyncConfig>>
    where
        F: FnOnce(&mut SyncConfig),
    {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let Some(mut config) = load(&tx, key.scope, &key.target_id)? else {
            return Ok(None);
        };
        apply(&mut config);
        config.updated_at = Utc::now();
        config.version += 1;

        store(&tx, &config)?;
        tx.commit()?;
        Ok(Some(config))
    }
}

fn load(conn: &Connection, scope: SyncScope, target_id: &str) -> Result<Option<SyncConfig>> {
    let config = conn
        .query_row(
            &format!(
                "SELECT {} FROM sync_configs WHERE scope = ?1 AND target_id = ?2",
                SELECT_COLUMNS
            ),
            params![scope, target_id],
            read_config,
        )
        .optional()?;
    Ok(config)
}

fn store(conn: &Connection, config: &SyncConfig) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_configs (
            scope, target_id, enabled, last_status, last_synced_at,
            last_attempted_at, retries, error, updated_at, version, explicit
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(scope, target_id) DO UPDATE SET
            enabled = excluded.enabled,
            explicit = excluded.explicit,
            last_status = excluded.last_status,
            last_synced_at = excluded.last_synced_at,
            last_attempted_at = excluded.last_attempted_at,
            retries = excluded.retries,
            error = excluded.error,
            updated_at = excluded.updated_at,
            version = excluded.version
        "#,
        params![
            config.scope,
            &config.target_id,
            config.enabled,
            config.last_status,
            config.last_synced_at.as_ref().map(encode_ts),
            config.last_attempted_at.as_ref().map(encode_ts),
            config.retries,
            config.error.as_deref(),
            encode_ts(&config.updated_at),
            config.version as i64,
            config.explicit,
        ],
    )?;
    Ok(())
}

fn read_config(row: &Row<'_>) -> rusqlite::Result<SyncConfig> {
    let updated_at: String = row.get(8)?;
    let version: i64 = row.get(9)?;

    Ok(SyncConfig {
        scope: row.get(0)?,
        target_id: row.get(1)?,
        enabled: row.get(2)?,
        explicit: row.get(10)?,
        last_status: row.get(3)?,
        last_synced_at: decode_opt_ts(4, row.get(4)?)?,
        last_attempted_at: decode_opt_ts(5, row.get(5)?)?,
        retries: row.get(6)?,
        error: row.get(7)?,
        updated_at: decode_ts(8, &updated_at)?,
        version: version.max(0) as u64,
    })
}
