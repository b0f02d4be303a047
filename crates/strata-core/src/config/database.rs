use serde::{Deserialize, Serialize};

/// Connection settings for one migrated database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,

    /// Connection pool size. Migrations hold a single connection per run.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Statement timeout in seconds. Zero leaves the server default in place.
    #[serde(default)]
    pub statement_timeout_secs: u64,

    /// Directory holding this database's `.sql` migrations.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            statement_timeout_secs: 0,
            migrations_dir: default_migrations_dir(),
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}
