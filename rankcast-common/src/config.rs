//! Bootstrap configuration and data directory resolution

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Default HTTP port for the rank predictor
pub const DEFAULT_PORT: u16 = 5780;

/// Default upload ceiling (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "RANKCAST_DATA_DIR";

/// Which backing store holds distribution artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON (or hand-placed CSV) file per (year, category) in the data directory
    #[default]
    File,
    /// `distributions` table in a SQLite database
    Sqlite,
}

/// Bootstrap configuration loaded from TOML
///
/// Read once at startup. Every field has a default, so an empty file (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    pub bind_address: String,

    /// Artifact directory (optional; see [`resolve_data_dir`])
    pub data_dir: Option<PathBuf>,

    pub store: StoreBackend,

    /// SQLite database file; defaults to `distributions.db` in the data directory
    pub sqlite_path: Option<PathBuf>,

    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,

    /// Load every stored distribution into the cache at startup
    pub warm_on_startup: bool,

    /// Invalidate cached entries when artifact files change on disk (file store only)
    pub watch_data_dir: bool,

    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            data_dir: None,
            store: StoreBackend::default(),
            sqlite_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            warm_on_startup: true,
            watch_data_dir: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load from `path`. A missing file yields the defaults.
    ///
    /// Logs nothing: it runs before the tracing subscriber is installed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        if config.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        Ok(config)
    }

    /// SQLite database location for a resolved data directory
    pub fn sqlite_path(&self, data_dir: &Path) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| data_dir.join("distributions.db"))
    }
}

/// Data directory resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config
/// 4. OS-dependent default
pub fn resolve_data_dir(cli_arg: Option<&Path>, env_var_name: &str, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.data_dir {
        return path.clone();
    }

    default_data_dir()
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rankcast"))
        .unwrap_or_else(|| PathBuf::from("./rankcast_data"))
}

/// Default config file location (`<config dir>/rankcast/rankcast.toml`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("rankcast").join("rankcast.toml"))
        .unwrap_or_else(|| PathBuf::from("rankcast.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5780);
        assert_eq!(config.store, StoreBackend::File);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.warm_on_startup);
        assert!(config.watch_data_dir);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000
            store = "sqlite"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.store, StoreBackend::Sqlite);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = TomlConfig::from_toml_str(r#"store = "redis""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        assert!(TomlConfig::from_toml_str("max_upload_bytes = 0").is_err());
    }

    #[test]
    fn test_sqlite_path_defaults_into_data_dir() {
        let config = TomlConfig::default();
        assert_eq!(
            config.sqlite_path(Path::new("/srv/rankcast")),
            PathBuf::from("/srv/rankcast/distributions.db")
        );
    }

    #[test]
    fn test_default_data_dir() {
        assert!(default_data_dir().ends_with("rankcast") || default_data_dir().ends_with("rankcast_data"));
    }
}
