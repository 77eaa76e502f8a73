//! Store configuration.
//!
//! Configuration is read from YAML. Every field has a default, so an empty
//! document is a valid configuration. The database URL can be overridden
//! with the `ATELIER_DATABASE_URL` environment variable.
//!
//! ```yaml
//! database_url: "sqlite://atelier.db"
//! application: "UI Tools Atelier"
//! quota_bytes: 52428800
//! persist:
//!   debounce_ms: 300
//!   debug: false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`StoreConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "ATELIER_DATABASE_URL";

/// Why a store configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file at `path` could not be read.
    #[error("cannot read store config {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Read failure reported by the OS.
        source: std::io::Error,
    },

    /// The document is not a valid store configuration.
    #[error("invalid store config: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// Top-level store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// `SQLite` connection URL, e.g. `sqlite://atelier.db` or `sqlite::memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pooled connections. In-memory databases always use one.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Application name written into export snapshots.
    #[serde(default = "default_application")]
    pub application: String,

    /// Storage quota in bytes reported by statistics, if any.
    #[serde(default)]
    pub quota_bytes: Option<u64>,

    /// Defaults for state persistence.
    #[serde(default)]
    pub persist: PersistConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            application: default_application(),
            quota_bytes: None,
            persist: PersistConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// A configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            ..Self::default()
        }
    }

    /// Whether the configured database lives only in memory.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Connection acquire timeout.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                self.database_url = url;
            }
        }
    }
}

/// Defaults applied to every persisted state container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistConfig {
    /// Quiet period before a burst of mutations is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Emit per-save and per-load debug events.
    #[serde(default)]
    pub debug: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            debug: false,
        }
    }
}

impl PersistConfig {
    /// The debounce interval as a [`Duration`].
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_database_url() -> String {
    "sqlite://atelier.db".to_owned()
}

const fn default_max_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_application() -> String {
    "UI Tools Atelier".to_owned()
}

const fn default_debounce_ms() -> u64 {
    300
}
