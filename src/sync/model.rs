//! Sync configuration, audit log and domain event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AtsSyncError;

/// Level at which a sync toggle applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    Organization,
    Job,
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::Organization => "organization",
            SyncScope::Job => "job",
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SyncScope {
    type Err = AtsSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(SyncScope::Organization),
            "job" => Ok(SyncScope::Job),
            other => Err(AtsSyncError::InvalidScope(other.to_string())),
        }
    }
}

/// Lifecycle status of a sync target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Disabled,
    Pending,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Disabled => "disabled",
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = AtsSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(SyncStatus::Disabled),
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "success" => Ok(SyncStatus::Success),
            "error" => Ok(SyncStatus::Error),
            other => Err(AtsSyncError::Storage(format!("unknown sync status: {}", other))),
        }
    }
}

/// Outcome recorded in an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Retrying,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Error => "error",
            LogStatus::Retrying => "retrying",
        }
    }
}

impl FromStr for LogStatus {
    type Err = AtsSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "error" => Ok(LogStatus::Error),
            "retrying" => Ok(LogStatus::Retrying),
            other => Err(AtsSyncError::Storage(format!("unknown log status: {}", other))),
        }
    }
}

/// Kind of record being pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Candidate,
    Application,
    Job,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Candidate => "candidate",
            EntityType::Application => "application",
            EntityType::Job => "job",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AtsSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(EntityType::Candidate),
            "application" => Ok(EntityType::Application),
            "job" => Ok(EntityType::Job),
            other => Err(AtsSyncError::Storage(format!("unknown entity type: {}", other))),
        }
    }
}

/// `(scope, target_id)` pair identifying a config record and a sync worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub scope: SyncScope,
    pub target_id: String,
}

impl TargetKey {
    pub fn new(scope: SyncScope, target_id: impl Into<String>) -> Self {
        Self {
            scope,
            target_id: target_id.into(),
        }
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self::new(SyncScope::Organization, id)
    }

    pub fn job(id: impl Into<String>) -> Self {
        Self::new(SyncScope::Job, id)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.target_id)
    }
}

/// Persisted sync toggle and last known outcome for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub scope: SyncScope,
    pub target_id: String,
    pub enabled: bool,
    /// Set by an operator toggle. A job record without it only carries sync
    /// status; its `enabled` mirrors the inherited organization value.
    #[serde(default = "explicit_default")]
    pub explicit: bool,
    pub last_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Transient failures in the current failure sequence
    pub retries: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write
    pub version: u64,
}

fn explicit_default() -> bool {
    true
}

impl SyncConfig {
    /// Fresh record created by a first toggle
    pub fn new(scope: SyncScope, target_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            scope,
            target_id: target_id.into(),
            enabled,
            explicit: true,
            last_status: if enabled {
                SyncStatus::Pending
            } else {
                SyncStatus::Disabled
            },
            last_synced_at: None,
            last_attempted_at: None,
            retries: 0,
            error: None,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    /// Status-only record for a target that inherits its toggle
    pub fn inherited(scope: SyncScope, target_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            explicit: false,
            ..Self::new(scope, target_id, enabled)
        }
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.scope, self.target_id.clone())
    }

    /// Operator toggle. Enabling keeps status and history; disabling only
    /// flips the status.
    pub fn apply_toggle(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.last_status = SyncStatus::Disabled;
        } else if self.last_status == SyncStatus::Disabled {
            self.last_status = SyncStatus::Pending;
        }
    }

    pub fn mark_syncing(&mut self, now: DateTime<Utc>) {
        self.last_attempted_at = Some(now);
        if self.enabled {
            self.last_status = SyncStatus::Syncing;
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = Some(now);
        self.retries = 0;
        self.error = None;
        self.last_status = self.status_if_enabled(SyncStatus::Success);
    }

    /// `failures` counts the failed attempts of the current sequence,
    /// including this one
    pub fn record_transient_failure(&mut self, failures: u32, message: impl Into<String>) {
        self.retries = failures;
        self.error = Some(message.into());
        self.last_status = self.status_if_enabled(SyncStatus::Error);
    }

    /// Permanent failures leave `retries` untouched
    pub fn record_permanent_failure(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.last_status = self.status_if_enabled(SyncStatus::Error);
    }

    pub fn mark_disabled(&mut self) {
        self.last_status = SyncStatus::Disabled;
    }

    // A record disabled while a push was in flight stays disabled
    fn status_if_enabled(&self, status: SyncStatus) -> SyncStatus {
        if self.enabled {
            status
        } else {
            SyncStatus::Disabled
        }
    }
}

/// Immutable audit record of one sync outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Assigned by the log store; 0 until appended
    #[serde(default)]
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub scope: SyncScope,
    pub target_id: String,
    pub entity_type: EntityType,
    pub status: LogStatus,
    pub message: String,
    pub retry_count: u32,
}

impl SyncLogEntry {
    pub fn new(
        target: &TargetKey,
        entity_type: EntityType,
        status: LogStatus,
        message: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            scope: target.scope,
            target_id: target.target_id.clone(),
            entity_type,
            status,
            message: message.into(),
            retry_count,
        }
    }
}

/// Change notification for a candidate, application or job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    pub organization_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Worker key: the job when the entity belongs to one, else the organization
    pub fn target(&self) -> TargetKey {
        match self.job_id {
            Some(ref job_id) => TargetKey::job(job_id.clone()),
            None => TargetKey::organization(self.organization_id.clone()),
        }
    }

    pub fn organization_key(&self) -> TargetKey {
        TargetKey::organization(self.organization_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse_and_display() {
        assert_eq!("job".parse::<SyncScope>().unwrap(), SyncScope::Job);
        assert_eq!(
            "organization".parse::<SyncScope>().unwrap(),
            SyncScope::Organization
        );
        assert!(matches!(
            "team".parse::<SyncScope>(),
            Err(AtsSyncError::InvalidScope(_))
        ));
        assert_eq!(TargetKey::job("job-1001").to_string(), "job:job-1001");
    }

    #[test]
    fn test_new_config_status_follows_enabled() {
        assert_eq!(
            SyncConfig::new(SyncScope::Job, "j", true).last_status,
            SyncStatus::Pending
        );
        assert_eq!(
            SyncConfig::new(SyncScope::Job, "j", false).last_status,
            SyncStatus::Disabled
        );
    }

    #[test]
    fn test_enable_toggle_keeps_history() {
        let mut config = SyncConfig::new(SyncScope::Job, "job-1", true);
        config.record_transient_failure(1, "timeout");
        config.record_transient_failure(2, "timeout");

        config.apply_toggle(true);
        assert_eq!(config.last_status, SyncStatus::Error);
        assert_eq!(config.retries, 2);
        assert_eq!(config.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_disable_toggle_sets_disabled_and_keeps_history() {
        let mut config = SyncConfig::new(SyncScope::Job, "job-1", true);
        config.record_transient_failure(1, "timeout");

        config.apply_toggle(false);
        assert!(!config.enabled);
        assert_eq!(config.last_status, SyncStatus::Disabled);
        assert_eq!(config.retries, 1);

        config.apply_toggle(true);
        assert_eq!(config.last_status, SyncStatus::Pending);
    }

    #[test]
    fn test_retries_follow_the_failure_sequence() {
        let mut config = SyncConfig::new(SyncScope::Job, "job-1", true);
        for failures in 1..=4 {
            config.record_transient_failure(failures, "503");
        }
        assert_eq!(config.retries, 4);

        // a fresh event after the ceiling starts a new sequence
        config.record_transient_failure(1, "503");
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn test_inherited_record_is_not_an_override() {
        let config = SyncConfig::inherited(SyncScope::Job, "job-1", true);
        assert!(!config.explicit);
        assert_eq!(config.last_status, SyncStatus::Pending);
        assert!(SyncConfig::new(SyncScope::Job, "job-1", true).explicit);

        let json = r#"{"scope":"job","target_id":"job-1","enabled":true,"last_status":"pending",
            "last_synced_at":null,"last_attempted_at":null,"retries":0,"error":null,
            "updated_at":"2026-01-01T00:00:00Z","version":1}"#;
        let parsed: SyncConfig = serde_json::from_str(json).unwrap();
        assert!(parsed.explicit);
    }

    #[test]
    fn test_success_resets_retries() {
        let mut config = SyncConfig::new(SyncScope::Organization, "org", true);
        config.record_transient_failure(1, "503");
        config.record_success(Utc::now());

        assert_eq!(config.retries, 0);
        assert_eq!(config.error, None);
        assert_eq!(config.last_status, SyncStatus::Success);
        assert!(config.last_synced_at.is_some());
    }

    #[test]
    fn test_permanent_failure_keeps_retries() {
        let mut config = SyncConfig::new(SyncScope::Job, "job-1", true);
        config.record_transient_failure(1, "503");
        config.record_permanent_failure("422 invalid email");

        assert_eq!(config.retries, 1);
        assert_eq!(config.last_status, SyncStatus::Error);
        assert_eq!(config.error.as_deref(), Some("422 invalid email"));
    }

    #[test]
    fn test_outcome_on_disabled_record_stays_disabled() {
        let mut config = SyncConfig::new(SyncScope::Job, "job-1", true);
        config.mark_syncing(Utc::now());
        config.apply_toggle(false);
        config.record_success(Utc::now());

        assert_eq!(config.last_status, SyncStatus::Disabled);
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_event_target() {
        let event = DomainEvent {
            entity_type: EntityType::Candidate,
            entity_id: "cand-1".to_string(),
            job_id: Some("job-1001".to_string()),
            organization_id: "org-sync".to_string(),
            payload: serde_json::Value::Null,
        };
        assert_eq!(event.target(), TargetKey::job("job-1001"));

        let org_only = DomainEvent {
            job_id: None,
            ..event
        };
        assert_eq!(org_only.target(), TargetKey::organization("org-sync"));
    }
}
