use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Where a configuration value came from
#[derive(Debug, Clone)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
    Nested,
}

/// Environment enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "development, testing, or production".to_string(),
            }),
        }
    }
}

/// Top-level configuration for a migration run
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub migrations: MigrationSettings,
    pub logging: LoggingConfig,
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Explicit dialect tag; detected from the URL scheme when absent
    pub dialect: Option<String>,
    pub max_connections: u32,
}

/// Runner behaviour settings
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub table: String,
    pub use_lock: bool,
    pub lock_timeout_secs: u64,
    pub allow_out_of_order: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            table: "schema_migrations".to_string(),
            use_lock: true,
            lock_timeout_secs: 60,
            allow_out_of_order: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl AppConfig {
    /// Build a configuration for the given database URL with every other value defaulted
    pub fn for_database(url: impl Into<String>) -> Self {
        Self {
            environment: Environment::default(),
            database: DatabaseConfig {
                url: url.into(),
                dialect: None,
                max_connections: 1,
            },
            migrations: MigrationSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let environment = get_env_or_default("APP_ENV", "development");
        let environment = Environment::from_str(&environment)?;

        let database = DatabaseConfig::from_env()?;
        let migrations = MigrationSettings::from_env()?;
        let logging = LoggingConfig::from_env()?;

        Ok(AppConfig {
            environment,
            database,
            migrations,
            logging,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.migrations.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("environment".to_string(), ConfigSource::EnvVar("APP_ENV".to_string()));
        sources.insert("database".to_string(), ConfigSource::Nested);
        sources.insert("migrations".to_string(), ConfigSource::Nested);
        sources.insert("logging".to_string(), ConfigSource::Nested);
        sources
    }
}

impl AppConfigTrait for DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = get_env_required("DATABASE_URL")?;
        let dialect = get_env_optional("DB_DIALECT");
        let max_connections = parse_env("DB_MAX_CONNECTIONS", "1", "max_connections", "positive integer")?;

        Ok(DatabaseConfig {
            url,
            dialect,
            max_connections,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "database_url".to_string(),
                reason: "Database URL cannot be empty".to_string(),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_connections".to_string(),
                reason: "At least one connection is required".to_string(),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("url".to_string(), ConfigSource::EnvVar("DATABASE_URL".to_string()));
        let dialect_source = match self.dialect {
            Some(_) => ConfigSource::EnvVar("DB_DIALECT".to_string()),
            None => ConfigSource::Default("detected from DATABASE_URL".to_string()),
        };
        sources.insert("dialect".to_string(), dialect_source);
        sources.insert(
            "max_connections".to_string(),
            ConfigSource::EnvVar("DB_MAX_CONNECTIONS".to_string()),
        );
        sources
    }
}

impl AppConfigTrait for MigrationSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let table = get_env_or_default("MIGRATIONS_TABLE", "schema_migrations");
        let use_lock = parse_env("MIGRATE_USE_LOCK", "true", "use_lock", "true or false")?;
        let lock_timeout_secs = parse_env(
            "MIGRATE_LOCK_TIMEOUT_SECS",
            "60",
            "lock_timeout_secs",
            "number of seconds",
        )?;
        let allow_out_of_order = parse_env(
            "MIGRATE_ALLOW_OUT_OF_ORDER",
            "false",
            "allow_out_of_order",
            "true or false",
        )?;

        Ok(MigrationSettings {
            table,
            use_lock,
            lock_timeout_secs,
            allow_out_of_order,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_plain_identifier(&self.table) {
            return Err(ConfigError::InvalidValue {
                field: "table".to_string(),
                value: self.table.clone(),
                expected: "a plain SQL identifier ([A-Za-z_][A-Za-z0-9_]*)".to_string(),
            });
        }

        if self.use_lock && self.lock_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "lock_timeout_secs".to_string(),
                reason: "Lock timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("table".to_string(), ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string()));
        sources.insert("use_lock".to_string(), ConfigSource::EnvVar("MIGRATE_USE_LOCK".to_string()));
        sources.insert(
            "lock_timeout_secs".to_string(),
            ConfigSource::EnvVar("MIGRATE_LOCK_TIMEOUT_SECS".to_string()),
        );
        sources.insert(
            "allow_out_of_order".to_string(),
            ConfigSource::EnvVar("MIGRATE_ALLOW_OUT_OF_ORDER".to_string()),
        );
        sources
    }
}

impl AppConfigTrait for LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let level = get_env_or_default("LOG_LEVEL", "info");
        let format = get_env_or_default("LOG_FORMAT", "compact");

        Ok(LoggingConfig { level, format })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "level".to_string(),
                value: self.level.clone(),
                expected: "trace, debug, info, warn, or error".to_string(),
            });
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "format".to_string(),
                value: self.format.clone(),
                expected: "compact, pretty, or json".to_string(),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("level".to_string(), ConfigSource::EnvVar("LOG_LEVEL".to_string()));
        sources.insert("format".to_string(), ConfigSource::EnvVar("LOG_FORMAT".to_string()));
        sources
    }
}

/// True when `name` can be interpolated into SQL as a bare identifier
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Helper functions for environment variable handling
fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str, field: &str, expected: &str) -> Result<T, ConfigError> {
    let raw = get_env_or_default(key, default);
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.clone(),
        expected: expected.to_string(),
    })
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue { field: String, value: String, expected: String },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "APP_ENV",
        "DATABASE_URL",
        "DB_DIALECT",
        "DB_MAX_CONNECTIONS",
        "MIGRATIONS_TABLE",
        "MIGRATE_USE_LOCK",
        "MIGRATE_LOCK_TIMEOUT_SECS",
        "MIGRATE_ALLOW_OUT_OF_ORDER",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    fn set_test_env() {
        env::set_var("APP_ENV", "testing");
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("DB_DIALECT", "sqlite");
        env::set_var("MIGRATIONS_TABLE", "ledger");
        env::set_var("MIGRATE_LOCK_TIMEOUT_SECS", "5");
        env::set_var("MIGRATE_ALLOW_OUT_OF_ORDER", "true");
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_FORMAT", "json");
    }

    fn clean_test_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        clean_test_env();
        set_test_env();

        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.environment, Environment::Testing);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.dialect.as_deref(), Some("sqlite"));
        assert_eq!(config.migrations.table, "ledger");
        assert_eq!(config.migrations.lock_timeout_secs, 5);
        assert!(config.migrations.allow_out_of_order);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_app_config_defaults() {
        clean_test_env();
        env::set_var("DATABASE_URL", "postgres://localhost/app");

        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.database.dialect, None);
        assert_eq!(config.database.max_connections, 1);
        assert_eq!(config.migrations.table, "schema_migrations");
        assert!(config.migrations.use_lock);
        assert_eq!(config.migrations.lock_timeout_secs, 60);
        assert!(!config.migrations.allow_out_of_order);
        assert_eq!(config.logging.level, "info");

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        clean_test_env();

        match AppConfig::from_env() {
            Err(ConfigError::MissingEnvVar { var }) => assert_eq!(var, "DATABASE_URL"),
            other => panic!("Expected MissingEnvVar error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_invalid_boolean_flag() {
        clean_test_env();
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("MIGRATE_USE_LOCK", "sometimes");

        match AppConfig::from_env() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "use_lock"),
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }

        clean_test_env();
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        config.migrations.table = "ledger; DROP TABLE users".to_string();

        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "table"),
            other => panic!("Expected InvalidValue error for table, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str("dev").unwrap(), Environment::Development);
        assert_eq!(Environment::from_str("test").unwrap(), Environment::Testing);
        assert_eq!(Environment::from_str("PROD").unwrap(), Environment::Production);
        assert!(Environment::from_str("staging").is_err());
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("schema_migrations"));
        assert!(is_plain_identifier("_ledger2"));
        assert!(!is_plain_identifier("2ledger"));
        assert!(!is_plain_identifier("public.ledger"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn test_config_sources() {
        let config = AppConfig::for_database("sqlite::memory:");
        let sources = config.config_sources();
        assert!(matches!(sources.get("environment"), Some(ConfigSource::EnvVar(_))));
        assert!(matches!(sources.get("database"), Some(ConfigSource::Nested)));

        let db_sources = config.database.config_sources();
        assert!(matches!(db_sources.get("dialect"), Some(ConfigSource::Default(_))));
    }
}
