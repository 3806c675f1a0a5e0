//! ats-sync - Synchronization control and audit for ATS pushes
//!
//! Decides, for every organization and job, whether candidate, application and
//! job records are pushed to an external applicant tracking system (OpenCATS),
//! executes those pushes with retry and backoff, and keeps an audit trail.
//!
//! # Architecture
//!
//! - **sync**: Config/log records, effective-state resolver, retry policy
//! - **store**: SQLite-backed config store and log store
//! - **executor**: Per-target single-flight workers
//! - **ats**: Outbound ATS seam and the OpenCATS adapter
//! - **api**: HTTP control API (axum)
//! - **directory**: Known organizations and jobs
//! - **config**: YAML settings

pub mod api;
pub mod ats;
pub mod config;
pub mod directory;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod store;
pub mod sync;

// Re-exports
pub use error::{AtsSyncError, Result};
