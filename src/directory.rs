//! Registry of known organizations and jobs
//!
//! The subsystem does not own these records; the directory answers existence
//! and job ownership questions for the Control API.

use crate::config::DirectorySettings;
use crate::sync::SyncScope;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

pub trait Directory: Send + Sync {
    fn organization_exists(&self, organization_id: &str) -> bool;

    /// Owning organization of a job, `None` for unknown jobs
    fn job_organization(&self, job_id: &str) -> Option<String>;

    fn contains(&self, scope: SyncScope, target_id: &str) -> bool {
        match scope {
            SyncScope::Organization => self.organization_exists(target_id),
            SyncScope::Job => self.job_organization(target_id).is_some(),
        }
    }
}

#[derive(Default)]
struct Entries {
    organizations: HashSet<String>,
    jobs: HashMap<String, String>,
}

/// Directory kept in memory, seeded from settings or registered at runtime
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: RwLock<Entries>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &DirectorySettings) -> Self {
        let directory = Self::new();
        for org in &settings.organizations {
            directory.add_organization(org);
        }
        for job in &settings.jobs {
            directory.add_job(&job.id, &job.organization_id);
        }
        directory
    }

    pub fn add_organization(&self, organization_id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.organizations.insert(organization_id.to_string());
        }
    }

    /// Register a job, implicitly registering its organization
    pub fn add_job(&self, job_id: &str, organization_id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.organizations.insert(organization_id.to_string());
            entries
                .jobs
                .insert(job_id.to_string(), organization_id.to_string());
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        self.entries
            .read()
            .map(|e| (e.organizations.len(), e.jobs.len()))
            .unwrap_or((0, 0))
    }
}

impl Directory for InMemoryDirectory {
    fn organization_exists(&self, organization_id: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.organizations.contains(organization_id))
            .unwrap_or(false)
    }

    fn job_organization(&self, job_id: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.jobs.get(job_id).cloned())
    }
}
