//! Installer configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, the
//! optional `config.toml` in the keg home directory, and environment
//! variables.
//!
//! ```toml
//! # ~/.keg/config.toml
//! cache-dir = "/var/cache/keg"
//! user-agent = "my-host/1.0"
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable overriding the keg home directory.
pub const HOME_ENV: &str = "KEG_HOME";

/// Environment variable overriding the download cache directory.
pub const CACHE_DIR_ENV: &str = "KEG_CACHE_DIR";

/// Name of the configuration file inside the home directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk configuration; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    cache_dir: Option<PathBuf>,
    user_agent: Option<String>,
}

/// Resolved installer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Keg home directory (holds `config.toml`).
    pub home: PathBuf,
    /// Directory for downloaded archives, keyed by content hash.
    pub cache_dir: PathBuf,
    /// User agent for HTTP requests.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_home(default_home())
    }
}

impl Config {
    /// Defaults for a given home directory, without reading anything.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            cache_dir: default_cache_dir(),
            user_agent: format!("keg/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Load configuration from the environment and `$KEG_HOME/config.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        let home = std::env::var_os(HOME_ENV).map_or_else(default_home, PathBuf::from);
        let mut config = Self::load_from(home)?;
        if let Some(cache_dir) = std::env::var_os(CACHE_DIR_ENV) {
            config.cache_dir = PathBuf::from(cache_dir);
        }
        Ok(config)
    }

    /// Load configuration from `home/config.toml` if it exists.
    pub fn load_from(home: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::with_home(home);
        let path = config.config_path();
        if !path.exists() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let file: ConfigFile =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;

        if let Some(cache_dir) = file.cache_dir {
            // Relative cache paths are relative to the home directory.
            config.cache_dir = if cache_dir.is_absolute() {
                cache_dir
            } else {
                config.home.join(cache_dir)
            };
        }
        if let Some(user_agent) = file.user_agent {
            config.user_agent = user_agent;
        }

        tracing::debug!(path = %config.config_path().display(), "loaded config file");
        Ok(config)
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    /// Path a cached archive with the given hash is stored at.
    #[must_use]
    pub fn cached_archive_path(&self, hash_hex: &str) -> PathBuf {
        self.cache_dir.join(format!("{hash_hex}.tar.gz"))
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".keg"), |home| home.join(".keg"))
}

/// Platform cache directory, falling back to a relative `.cache`.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("keg")
        .join("downloads")
}
