use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres};
use strata_core::config::DatabaseConfig;
use strata_core::database::Database;
use strata_core::error::{Result, StrataError};
use tracing::debug;

/// Connection handed to PostgreSQL migrations and record stores.
pub type PgPoolConnection = PoolConnection<Postgres>;

/// PostgreSQL database handle backed by a connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect a pool from configuration.
    ///
    /// An unreachable server or a malformed url is a [`StrataError::Connection`].
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let statement_timeout_ms = config.statement_timeout_secs.saturating_mul(1000);

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if statement_timeout_ms > 0 {
                        conn.execute(
                            format!("SET statement_timeout = {}", statement_timeout_ms).as_str(),
                        )
                        .await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| StrataError::Connection(format!("Failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StrataError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Database for PgDatabase {
    type Connection = PgPoolConnection;

    fn make_connection(&self) -> BoxFuture<'_, Result<Self::Connection>> {
        Box::pin(async move {
            debug!(
                idle = self.pool.num_idle(),
                size = self.pool.size(),
                "Acquiring migration connection"
            );
            self.pool
                .acquire()
                .await
                .map_err(|e| StrataError::Connection(format!("Failed to acquire connection: {}", e)))
        })
    }
}
