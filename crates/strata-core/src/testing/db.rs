//! PostgreSQL databases for migration tests.
//!
//! Tests opt in by setting `TEST_DATABASE_URL`. Each test migrates its own
//! throwaway database, so records written by one run never leak into another.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::error::{Result, StrataError};

/// Server that hosts per-test databases.
///
/// ```ignore
/// let Ok(server) = TestDatabase::from_env().await else { return };
/// let db = server.isolated("batch_numbers").await?;
/// // ... migrate db.pool() ...
/// db.cleanup().await?;
/// ```
pub struct TestDatabase {
    admin: PgPool,
    options: PgConnectOptions,
    url: String,
}

impl TestDatabase {
    /// Connect using `TEST_DATABASE_URL`.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("TEST_DATABASE_URL")
            .map_err(|_| StrataError::Config("TEST_DATABASE_URL is not set".to_string()))?;

        let options: PgConnectOptions = url.parse()?;
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        Ok(Self {
            admin,
            options,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create an empty database named after `label`.
    pub async fn isolated(&self, label: &str) -> Result<IsolatedTestDb> {
        let label: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .take(24)
            .collect();
        let name = format!("strata_{}_{}", label, uuid::Uuid::new_v4().simple());

        sqlx::query(&format!("CREATE DATABASE \"{}\"", name))
            .execute(&self.admin)
            .await?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(self.options.clone().database(&name))
            .await?;

        Ok(IsolatedTestDb {
            pool,
            name,
            admin: self.admin.clone(),
        })
    }
}

/// A database that lives until [`cleanup`](Self::cleanup).
pub struct IsolatedTestDb {
    pool: PgPool,
    name: String,
    admin: PgPool,
}

impl IsolatedTestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Row count of `table`, a trusted identifier.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name))
            .execute(&self.admin)
            .await?;
        Ok(())
    }
}
