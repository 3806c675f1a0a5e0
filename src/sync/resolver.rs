//! Effective sync state
//!
//! A job syncs when its own override says so. Without an override it
//! inherits the organization toggle, and with neither it does not sync. A job
//! record that only carries sync status (`explicit == false`) is not an
//! override.

use super::model::{SyncConfig, SyncStatus, TargetKey};
use serde::Serialize;

/// Which record supplied the effective value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    Job,
    Organization,
    Default,
}

impl StateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateSource::Job => "job",
            StateSource::Organization => "organization",
            StateSource::Default => "default",
        }
    }
}

/// Resolved eligibility plus what the UI should display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveState {
    pub enabled: bool,
    pub source: StateSource,
    pub status: SyncStatus,
    /// Record whose status reflects this target's syncs
    pub owner: Option<TargetKey>,
}

/// Should this job sync right now
pub fn resolve(org: Option<&SyncConfig>, job: Option<&SyncConfig>) -> bool {
    match (job.filter(|j| j.explicit), org) {
        (Some(job), _) => job.enabled,
        (None, Some(org)) => org.enabled,
        (None, None) => false,
    }
}

fn source(org: Option<&SyncConfig>, job: Option<&SyncConfig>) -> StateSource {
    match (job.filter(|j| j.explicit), org) {
        (Some(_), _) => StateSource::Job,
        (None, Some(_)) => StateSource::Organization,
        (None, None) => StateSource::Default,
    }
}

/// The job's own record owns its status whether or not it overrides the
/// toggle; a job without one shows the organization record.
pub fn effective_state(org: Option<&SyncConfig>, job: Option<&SyncConfig>) -> EffectiveState {
    let owner = job.or(org);
    let source = source(org, job);
    let enabled = resolve(org, job);

    let status = match owner {
        _ if !enabled => SyncStatus::Disabled,
        Some(config) if config.last_status == SyncStatus::Disabled => SyncStatus::Pending,
        Some(config) => config.last_status,
        None => SyncStatus::Pending,
    };

    EffectiveState {
        enabled,
        source,
        status,
        owner: owner.map(SyncConfig::key),
    }
}
