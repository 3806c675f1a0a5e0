//! Error types for ats-sync
//!
//! One enum for store, config, resolver and push failures. The control API
//! maps it onto HTTP status codes.

use crate::ats::PushError;
use thiserror::Error;

/// Result type alias for ats-sync operations
pub type Result<T> = std::result::Result<T, AtsSyncError>;

/// Errors raised by ats-sync operations
#[derive(Error, Debug)]
pub enum AtsSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors that are not raw SQLite failures (lock poisoning, corrupt rows)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unknown scope, target or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid scope string
    #[error("Invalid scope: {0} (expected 'organization' or 'job')")]
    InvalidScope(String),

    /// Optimistic update lost against a concurrent write
    #[error("Version conflict on {target}: expected {expected}, found {actual}")]
    Conflict {
        target: String,
        expected: u64,
        actual: u64,
    },

    /// Operation needs sync to be in effect for the target
    #[error("Sync is not in effect for {0}")]
    SyncDisabled(String),

    /// Config missing where the executor expected one
    #[error("Resolver inconsistency: {0}")]
    ResolverInconsistency(String),

    /// Outbound push failures
    #[error("Push error: {0}")]
    Push(#[from] PushError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// OpenCATS client errors
    #[error("OpenCATS error: {0}")]
    OpenCats(#[from] opencats::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl AtsSyncError {
    /// Whether the error comes from the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, AtsSyncError::Storage(_) | AtsSyncError::Database(_))
    }
}
