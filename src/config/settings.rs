use crate::store::Database;
use crate::sync::RetryConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Control API server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Log page size when the request gives no limit
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound for the `limit` query parameter
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    100
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Retry policy as written in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Entries kept before the oldest are evicted
    #[serde(default = "default_retention")]
    pub retention: usize,
}

fn default_retention() -> usize {
    1_000
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_db_path() -> PathBuf {
    let mut path = config_dir();
    path.push("sync.db");
    path
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
        }
    }
}

impl StorageSettings {
    pub fn open(&self) -> Result<Database> {
        Database::open(&self.path, self.wal_mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCatsSettings {
    #[serde(default = "default_opencats_url")]
    pub base_url: String,

    /// Environment variable holding the API token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

fn default_opencats_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENCATS_API_KEY".to_string())
}

impl Default for OpenCatsSettings {
    fn default() -> Self {
        Self {
            base_url: default_opencats_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    pub id: String,
    pub organization_id: String,
}

/// Known organizations and jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySettings {
    #[serde(default)]
    pub organizations: Vec<String>,

    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Capacity of the inbound domain event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of the executor event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_queue_capacity() -> usize {
    1_024
}

fn default_event_channel_capacity() -> usize {
    256
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Service configuration, loaded from `~/.config/ats-sync/config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logs: LogSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub opencats: OpenCatsSettings,

    #[serde(default)]
    pub directory: DirectorySettings,

    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl Settings {
    /// Load settings from the default path
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load settings from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::AtsSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading ats-sync configuration");

        let content = fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            bind = %settings.server.bind,
            organizations = settings.directory.organizations.len(),
            jobs = settings.directory.jobs.len(),
            "Configuration loaded successfully"
        );

        Ok(settings)
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save settings to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving ats-sync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/ats-sync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = config_dir();
        path.push("config.yaml");
        path
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
            jitter: self.retry.jitter,
        }
    }
}

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("ats-sync");
    path
}
