mod database;
mod logging;

pub use database::DatabaseConfig;
pub use logging::{LogFormat, LoggingConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, StrataError};

/// Root configuration for STRATA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Migration bookkeeping configuration.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Databases to migrate, keyed by identifier.
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl StrataConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StrataError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with a single database named `id`.
    pub fn with_database(id: &str, url: &str) -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(
            id.to_string(),
            DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
        );

        Self {
            project: ProjectConfig::default(),
            logging: LoggingConfig::default(),
            migrations: MigrationsConfig::default(),
            databases,
        }
    }

    /// Look up a database by identifier.
    pub fn database(&self, id: &str) -> Result<&DatabaseConfig> {
        self.databases
            .get(id)
            .ok_or_else(|| StrataError::DatabaseNotFound(id.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.databases.is_empty() {
            return Err(StrataError::Config(
                "At least one [databases.<id>] table is required".into(),
            ));
        }

        for (id, db) in &self.databases {
            if db.url.is_empty() {
                return Err(StrataError::Config(format!(
                    "Database '{}' has an empty url",
                    id
                )));
            }
        }

        if !is_valid_identifier(&self.migrations.table) {
            return Err(StrataError::Config(format!(
                "Invalid migrations table name: {}",
                self.migrations.table
            )));
        }

        Ok(())
    }
}

/// Project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_project_name")]
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

fn default_project_name() -> String {
    "strata-app".to_string()
}

/// Migration bookkeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Table holding one row per applied migration.
    #[serde(default = "default_table")]
    pub table: String,

    /// Serialize concurrent runs against one database with an advisory lock.
    #[serde(default = "default_true")]
    pub lock: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            lock: true,
        }
    }
}

fn default_table() -> String {
    "strata_migrations".to_string()
}

fn default_true() -> bool {
    true
}

/// Whether `name` is usable as an unquoted SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
