use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;
use crate::models::Category;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Environment variable overriding `remote.access_token`.
pub const ENV_ACCESS_TOKEN: &str = "MARQUEE_ACCESS_TOKEN";
/// Environment variable overriding `remote.account_id`.
pub const ENV_ACCOUNT_ID: &str = "MARQUEE_ACCOUNT_ID";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub default_category: Category,
    pub language: String,
    pub region: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_category: Category::Watching,
            language: "en-US".into(),
            region: "US".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Bearer token for account-scoped calls.
    pub access_token: Option<String>,
    pub account_id: Option<u64>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".into(),
            api_key: None,
            access_token: None,
            account_id: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to this file (daily rotation) when set.
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Built-in defaults shipped with the binary.
    pub fn builtin() -> Result<Self, MarqueeError> {
        toml::from_str(DEFAULT_CONFIG).map_err(|e| MarqueeError::Config(e.to_string()))
    }

    /// Load config: user file (if exists) over built-in defaults, then env overrides.
    pub fn load() -> Result<Self, MarqueeError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, falling back to built-in defaults when it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, MarqueeError> {
        if !path.exists() {
            return Self::builtin();
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content).map_err(|e| {
            MarqueeError::Config(format!("{}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Override remote credentials from the environment.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.remote.access_token = Some(token.trim().to_owned());
        }
        if let Some(raw) = lookup(ENV_ACCOUNT_ID) {
            match raw.trim().parse() {
                Ok(id) => self.remote.account_id = Some(id),
                Err(_) => tracing::warn!(var = ENV_ACCOUNT_ID, value = %raw, "Ignoring invalid account id"),
            }
        }
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), MarqueeError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), MarqueeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MarqueeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("marquee.db"))
            .unwrap_or_else(|| PathBuf::from("marquee.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, MarqueeError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "marquee")
    }
}
