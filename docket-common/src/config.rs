//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every section is
//! optional; a missing file logs a warning and falls back to built-in defaults.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `DOCKET_SYNC_CONFIG` environment variable
//! 3. `~/.config/docket-sync/config.toml`, then `/etc/docket-sync/config.toml`
//!
//! Root folder resolution order:
//! 1. Command-line argument
//! 2. `DOCKET_SYNC_ROOT` environment variable
//! 3. `root_folder` from the TOML file
//! 4. OS-dependent default

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "DOCKET_SYNC_CONFIG";
pub const ROOT_ENV_VAR: &str = "DOCKET_SYNC_ROOT";
pub const DATABASE_FILE_NAME: &str = "docket-sync.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the state database
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub alerts: AlertConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error); RUST_LOG wins
    pub level: String,
    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Operator API listener
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records created before this date are never onboarded or updated
    pub cutoff_date: Option<NaiveDate>,
    /// Minimum age in business days before onboarding
    pub cooling_business_days: u32,
    /// Seconds between reconciliation passes
    pub interval_secs: u64,
    /// Seconds between hearing-only passes
    pub hearing_interval_secs: u64,
    /// Target board (external container id)
    pub board_id: String,
    /// Attempt ceiling for transient failures
    pub max_attempts: u32,
    /// Consecutive failures that trip the breaker; 0 disables it
    pub breaker_threshold: u32,
    /// Run lock lifetime; an expired lock is reclaimable
    pub run_lock_ttl_secs: u64,
    /// Board metadata cache lifetime
    pub metadata_ttl_secs: u64,
    /// Ordered list of hashed case fields; `None` means all fields
    pub tracked_fields: Option<Vec<String>>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cutoff_date: None,
            cooling_business_days: 3,
            interval_secs: 300,
            hearing_interval_secs: 60,
            board_id: String::new(),
            max_attempts: 3,
            breaker_threshold: 5,
            run_lock_ttl_secs: 1800,
            metadata_ttl_secs: 600,
            tracked_fields: None,
        }
    }
}

impl SyncConfig {
    /// Cutoff date, which has no default
    pub fn cutoff(&self) -> Result<NaiveDate> {
        self.cutoff_date
            .ok_or_else(|| Error::InvalidSetting {
                key: "sync.cutoff_date",
                reason: "required".to_string(),
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.cutoff()?;
        if self.board_id.trim().is_empty() {
            return Err(Error::InvalidSetting {
                key: "sync.board_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.interval_secs == 0 || self.hearing_interval_secs == 0 {
            return Err(Error::InvalidSetting {
                key: "sync.interval_secs",
                reason: "interval_secs and hearing_interval_secs must be > 0".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidSetting {
                key: "sync.max_attempts",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.run_lock_ttl_secs == 0 {
            return Err(Error::InvalidSetting {
                key: "sync.run_lock_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Alert notification settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// A fingerprint sent within this window is suppressed
    pub dedup_window_secs: u64,
    /// Maximum alerts sent per rolling hour; 0 disables the cap
    pub hourly_cap: u32,
    /// Bounded queue between the sync loop and the delivery task
    pub queue_capacity: usize,
    /// Period of the summary/digest flush
    pub summary_interval_secs: u64,
    /// Component name folded into alert fingerprints
    pub source_component: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 3600,
            hourly_cap: 20,
            queue_capacity: 100,
            summary_interval_secs: 86_400,
            source_component: "docket-sync".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from an explicit path; the file must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load the config file, falling back to defaults when none is found.
    ///
    /// An explicitly named file that fails to load is an error.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }
        match default_config_path() {
            Some(path) => Self::load(&path),
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("docket-sync").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/docket-sync/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Resolve the root folder holding the state database
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("docket-sync"))
        .unwrap_or_else(|| PathBuf::from("./docket-sync-data"))
}

/// Path of the state database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}
