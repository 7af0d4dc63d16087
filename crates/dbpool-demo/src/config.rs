//! Demo configuration loading from file and environment variables.

use dbpool::PoolConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level demo configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection and sizing settings for the pool.
    #[serde(default = "default_pool")]
    pub pool: PoolConfig,

    /// Where the bundled driver keeps its database files.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration for the bundled SQLite driver.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one `<identifier>.db` file per database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "dbpool=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_pool() -> PoolConfig {
    PoolConfig::new("127.0.0.1", 1521, "dbpool", "dbpool").with_service_name("demo")
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: default_pool(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DBPOOL_HOST`, `DBPOOL_PORT`, `DBPOOL_USERNAME`, `DBPOOL_PASSWORD`
///   override the matching `pool` fields
/// - `DBPOOL_SID` and `DBPOOL_SERVICE_NAME` set `pool.sid` and
///   `pool.service_name`
/// - `DBPOOL_DATA_DIR` overrides `storage.data_dir`
/// - `DBPOOL_LOG_LEVEL` overrides `logging.level`
/// - `DBPOOL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("DBPOOL_HOST") {
        config.pool.host = host;
    }
    if let Some(port) = var("DBPOOL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.pool.port = parsed;
        }
    }
    if let Some(username) = var("DBPOOL_USERNAME") {
        config.pool.username = username;
    }
    if let Some(password) = var("DBPOOL_PASSWORD") {
        config.pool.password = password;
    }
    if let Some(sid) = var("DBPOOL_SID") {
        config.pool.sid = Some(sid);
    }
    if let Some(service_name) = var("DBPOOL_SERVICE_NAME") {
        config.pool.service_name = Some(service_name);
    }
    if let Some(data_dir) = var("DBPOOL_DATA_DIR") {
        config.storage.data_dir = data_dir;
    }
    if let Some(level) = var("DBPOOL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("DBPOOL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file should not be an error");

        assert_eq!(config.pool.host, "127.0.0.1");
        assert_eq!(config.pool.service_name.as_deref(), Some("demo"));
        assert_eq!(config.storage.data_dir, "data");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn pool_table_is_read_from_toml() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[pool]
host = "db.internal"
port = 1522
username = "app"
password = "secret"
sid = "ORCL"
min_size = 2
max_size = 2

[storage]
data_dir = "/var/lib/dbpool"

[logging]
json = true
"#,
        )
        .expect("should write config");

        let config = load_config(path.to_str()).expect("should parse");
        assert_eq!(config.pool.host, "db.internal");
        assert_eq!(config.pool.port, 1522);
        assert_eq!(config.pool.sid.as_deref(), Some("ORCL"));
        assert_eq!(config.pool.service_name, None);
        assert_eq!(config.pool.max_size, 2);
        assert_eq!(config.storage.data_dir, "/var/lib/dbpool");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pool\nhost = ").expect("should write config");

        let err = load_config(path.to_str()).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("DBPOOL_HOST", "10.0.0.5"),
            ("DBPOOL_PORT", "not-a-port"),
            ("DBPOOL_PASSWORD", "rotated"),
            ("DBPOOL_SID", "XE"),
            ("DBPOOL_DATA_DIR", "/tmp/dbpool"),
            ("DBPOOL_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.pool.host, "10.0.0.5");
        assert_eq!(config.pool.port, 1521, "unparseable port is ignored");
        assert_eq!(config.pool.password, "rotated");
        assert_eq!(config.pool.sid.as_deref(), Some("XE"));
        assert_eq!(config.pool.service_name.as_deref(), Some("demo"));
        assert_eq!(config.storage.data_dir, "/tmp/dbpool");
        assert!(config.logging.json);
    }
}
