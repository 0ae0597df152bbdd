use crate::core::db::transaction::IsolationLevel;
use crate::core::{NestqlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: Option<LoggingConfig>,
}

/// Connection-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite file, `:memory:`, or a `file:` URI.
    pub connection_string: String,
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: Option<bool>,
    pub journal_mode: Option<String>,
    /// Isolation level used by `transaction_do` when none is given.
    pub isolation_level: Option<IsolationLevel>,
    pub read_only: Option<bool>,
}

impl DatabaseConfig {
    /// A configuration with only the connection string set.
    pub fn new(connection_string: &str) -> Self {
        DatabaseConfig {
            connection_string: connection_string.to_string(),
            busy_timeout_ms: None,
            foreign_keys: None,
            journal_mode: None,
            isolation_level: None,
            read_only: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// A `tracing` filter directive such as `info` or `nestql=debug`.
    pub level: Option<String>,
}

impl FromStr for Config {
    type Err = NestqlError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NestqlError::Config(e.to_string()))
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = nestql::load_config("nestql.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    content.parse()
}

/// The per-user configuration file, e.g. `~/.config/nestql/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nestql").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_CONFIG: &str = r#"
[database]
connection_string = "app.db"
busy_timeout_ms = 2500
foreign_keys = true
journal_mode = "WAL"
isolation_level = "immediate"

[logging]
level = "nestql=debug"
"#;

    #[test]
    fn test_load_config_from_str() {
        let config: Config = SAMPLE_CONFIG.parse().expect("Failed to parse sample config");
        assert_eq!(config.database.connection_string, "app.db");
        assert_eq!(config.database.busy_timeout_ms, Some(2500));
        assert_eq!(config.database.foreign_keys, Some(true));
        assert_eq!(config.database.isolation_level, Some(IsolationLevel::Immediate));
        assert!(config.database.read_only.is_none());
        if let Some(logging) = config.logging {
            assert_eq!(logging.level.unwrap(), "nestql=debug");
        } else {
            panic!("Logging configuration not found");
        }
    }

    #[test]
    fn test_minimal_config() {
        let config: Config = "[database]\nconnection_string = \":memory:\"\n"
            .parse()
            .unwrap();
        assert_eq!(config.database.connection_string, ":memory:");
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let result = "[database]\nisolation_level = \"serializable\"\n".parse::<Config>();
        assert!(matches!(result, Err(NestqlError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.journal_mode.as_deref(), Some("WAL"));

        assert!(matches!(
            load_config("/nonexistent/nestql.toml"),
            Err(NestqlError::Io(_))
        ));
    }
}
