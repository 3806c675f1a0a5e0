//! Configuration system
//!
//! Loads ~/.config/ats-sync/config.yaml with sections for:
//! - Control API server and pagination
//! - Retry policy and log retention
//! - SQLite storage
//! - OpenCATS endpoint and credentials
//! - Known organizations and jobs

mod settings;
pub mod validation;

pub use settings::{
    DirectorySettings, ExecutorSettings, JobEntry, LogSettings, OpenCatsSettings, RetrySettings,
    ServerSettings, Settings, StorageSettings,
};
pub use validation::{validate_settings, validate_settings_result, ValidationError};
