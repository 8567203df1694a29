use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ArchZeroConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted session record and token slot.
    /// A leading `~` is expanded.
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "~/.archzero".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).into_owned())
    }
}

/// Role enforcement is off by default: protected views only require an
/// authenticated session until the product owner decides on role gating.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GuardConfig {
    #[serde(default)]
    pub enforce_roles: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ArchZeroConfig {
    /// Load `path` (optional, TOML) overlaid with `ARCHZERO_*` environment
    /// variables, e.g. `ARCHZERO_API__BASE_URL`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ARCHZERO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}
