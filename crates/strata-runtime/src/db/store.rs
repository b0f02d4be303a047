use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use strata_core::config::{is_valid_identifier, MigrationsConfig};
use strata_core::error::{Result, StrataError};
use strata_core::migration::{MigrationRecord, RecordStore};
use tracing::{debug, warn};

use super::pool::PgPoolConnection;

const DEFAULT_TABLE: &str = "strata_migrations";

/// Record store keeping one row per applied migration in a PostgreSQL table.
///
/// With locking enabled, a run holds a session advisory lock derived from the
/// table name, so concurrent runs against the same database queue up instead
/// of computing the same batch twice.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    table: String,
    lock: bool,
}

impl Default for PgRecordStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            lock: true,
        }
    }
}

impl PgRecordStore {
    /// Store using `table`, which must be a plain SQL identifier.
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(StrataError::Config(format!(
                "Invalid migrations table name: {}",
                table
            )));
        }
        Ok(Self { table, lock: true })
    }

    pub fn from_config(config: &MigrationsConfig) -> Result<Self> {
        Ok(Self::new(config.table.clone())?.with_lock(config.lock))
    }

    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Advisory lock key: 64-bit FNV-1a of the table name.
    fn lock_id(&self) -> i64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.table.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash as i64
    }
}

impl RecordStore<PgPoolConnection> for PgRecordStore {
    fn ensure_schema_ready<'a>(
        &'a self,
        conn: &'a mut PgPoolConnection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    name VARCHAR(255) NOT NULL UNIQUE,
                    batch BIGINT NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                self.table
            );
            sqlx::query(&sql)
                .execute(&mut **conn)
                .await
                .map_err(|e| StrataError::store("ensure_schema_ready", e))?;
            Ok(())
        })
    }

    fn latest_batch<'a>(&'a self, conn: &'a mut PgPoolConnection) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            let sql = format!("SELECT COALESCE(MAX(batch), 0) FROM {}", self.table);
            sqlx::query_scalar::<_, i64>(&sql)
                .fetch_one(&mut **conn)
                .await
                .map_err(|e| StrataError::store("latest_batch", e))
        })
    }

    fn has_record<'a>(
        &'a self,
        name: &'a str,
        conn: &'a mut PgPoolConnection,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1)", self.table);
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(name)
                .fetch_one(&mut **conn)
                .await
                .map_err(|e| StrataError::store("has_record", e))
        })
    }

    fn write_record<'a>(
        &'a self,
        name: &'a str,
        batch: i64,
        conn: &'a mut PgPoolConnection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = format!("INSERT INTO {} (name, batch) VALUES ($1, $2)", self.table);
            sqlx::query(&sql)
                .bind(name)
                .bind(batch)
                .execute(&mut **conn)
                .await
                .map_err(|e| StrataError::store("write_record", e))?;
            Ok(())
        })
    }

    fn applied<'a>(
        &'a self,
        conn: &'a mut PgPoolConnection,
    ) -> BoxFuture<'a, Result<Vec<MigrationRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT name, batch, applied_at FROM {} ORDER BY batch ASC, id ASC",
                self.table
            );
            let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as(&sql)
                .fetch_all(&mut **conn)
                .await
                .map_err(|e| StrataError::store("applied", e))?;

            Ok(rows
                .into_iter()
                .map(|(name, batch, applied_at)| MigrationRecord {
                    name,
                    batch,
                    applied_at,
                })
                .collect())
        })
    }

    fn lock<'a>(&'a self, conn: &'a mut PgPoolConnection) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.lock {
                return Ok(());
            }
            debug!(table = %self.table, "Waiting for migration lock");
            sqlx::query("SELECT pg_advisory_lock($1)")
                .bind(self.lock_id())
                .execute(&mut **conn)
                .await
                .map_err(|e| StrataError::store("lock", e))?;
            Ok(())
        })
    }

    fn unlock<'a>(&'a self, conn: &'a mut PgPoolConnection) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.lock {
                return Ok(());
            }
            let released = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
                .bind(self.lock_id())
                .fetch_one(&mut **conn)
                .await;

            match released {
                Ok(true) => Ok(()),
                Ok(false) => {
                    warn!(table = %self.table, "Migration lock was not held by this session");
                    Ok(())
                }
                Err(e) => {
                    // A session lock only dies with its session
                    conn.close_on_drop();
                    Err(StrataError::store("unlock", e))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_core::database::{DatabaseId, Databases};
    use strata_core::testing::TestDatabase;
    use strata_core::FnMigration;

    use super::*;
    use crate::db::PgDatabase;
    use crate::migrations::{DatabaseMigrations, SqlMigration};

    #[test]
    fn test_default_store() {
        let store = PgRecordStore::default();
        assert_eq!(store.table(), "strata_migrations");
        assert!(store.lock);
    }

    #[test]
    fn test_table_name_validated() {
        assert!(PgRecordStore::new("schema_log").is_ok());
        assert!(matches!(
            PgRecordStore::new("log; DROP TABLE users"),
            Err(StrataError::Config(_))
        ));
        assert!(PgRecordStore::new("").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = MigrationsConfig {
            table: "app_migrations".into(),
            lock: false,
        };
        let store = PgRecordStore::from_config(&config).unwrap();
        assert_eq!(store.table(), "app_migrations");
        assert!(!store.lock);
    }

    #[test]
    fn test_lock_id_depends_on_table() {
        let a = PgRecordStore::new("strata_migrations").unwrap();
        let b = PgRecordStore::new("other_migrations").unwrap();
        assert_eq!(a.lock_id(), PgRecordStore::default().lock_id());
        assert_ne!(a.lock_id(), b.lock_id());
    }

    #[tokio::test]
    async fn test_batches_recorded_in_postgres() {
        let Ok(base) = TestDatabase::from_env().await else {
            return;
        };
        let test_db = base.isolated("pg_record_store").await.unwrap();

        const MAIN: DatabaseId<PgDatabase> = DatabaseId::new("main");
        let databases = Databases::builder()
            .register(&MAIN, PgDatabase::from_pool(test_db.pool().clone()))
            .build()
            .unwrap();

        let first = DatabaseMigrations::builder(MAIN, PgRecordStore::default())
            .add(SqlMigration::new(
                "0001_users",
                "CREATE TABLE users (id INT); INSERT INTO users VALUES (1);",
            ))
            .build();
        let report = first.migrate(&databases).await.unwrap();
        assert_eq!(report.batch, 1);
        assert_eq!(report.applied, vec!["0001_users"]);

        let second = DatabaseMigrations::builder(MAIN, PgRecordStore::default())
            .add(SqlMigration::new(
                "0001_users",
                "CREATE TABLE users (id INT);",
            ))
            .add(SqlMigration::new(
                "0002_posts",
                "CREATE TABLE posts (id INT)",
            ))
            .add(FnMigration::new(
                "seed_posts",
                |conn: &mut PgPoolConnection| {
                    Box::pin(async move {
                        sqlx::query("INSERT INTO posts VALUES (1), (2)")
                            .execute(&mut **conn)
                            .await?;
                        Ok(())
                    })
                },
            ))
            .build();
        let report = second.migrate(&databases).await.unwrap();
        assert_eq!(report.batch, 2);
        assert_eq!(report.applied, vec!["0002_posts", "seed_posts"]);
        assert_eq!(report.skipped, vec!["0001_users"]);

        let status = second.status(&databases).await.unwrap();
        let batches: Vec<(String, i64)> = status
            .applied
            .iter()
            .map(|r| (r.name.clone(), r.batch))
            .collect();
        assert_eq!(
            batches,
            vec![
                ("0001_users".to_string(), 1),
                ("0002_posts".to_string(), 2),
                ("seed_posts".to_string(), 2)
            ]
        );
        assert_eq!(status.next_batch, 3);
        assert!(status.pending.is_empty());
        assert_eq!(test_db.count_rows("posts").await.unwrap(), 2);

        test_db.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_sql_migration_rolls_back() {
        let Ok(base) = TestDatabase::from_env().await else {
            return;
        };
        let test_db = base.isolated("pg_failed_migration").await.unwrap();

        const MAIN: DatabaseId<PgDatabase> = DatabaseId::new("main");
        let databases = Databases::builder()
            .register(&MAIN, PgDatabase::from_pool(test_db.pool().clone()))
            .build()
            .unwrap();

        let migrations = DatabaseMigrations::builder(MAIN, PgRecordStore::default())
            .add(SqlMigration::new(
                "0001_broken",
                "CREATE TABLE half (id INT); SELECT * FROM missing_table;",
            ))
            .build();

        let err = migrations.migrate(&databases).await.unwrap_err();
        assert_eq!(err.failed_migration(), Some("0001_broken"));
        assert_eq!(test_db.count_rows("strata_migrations").await.unwrap(), 0);

        let half_exists: bool =
            sqlx::query_scalar("SELECT to_regclass('public.half') IS NOT NULL")
                .fetch_one(test_db.pool())
                .await
                .unwrap();
        assert!(!half_exists);

        test_db.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_advisory_lock_released_after_run() {
        let Ok(base) = TestDatabase::from_env().await else {
            return;
        };
        let test_db = base.isolated("pg_advisory_lock").await.unwrap();
        let db = PgDatabase::from_pool(test_db.pool().clone());
        let store = PgRecordStore::default();

        let mut conn = strata_core::Database::make_connection(&db).await.unwrap();
        store.lock(&mut conn).await.unwrap();
        store.unlock(&mut conn).await.unwrap();
        drop(conn);

        let free: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(store.lock_id())
            .fetch_one(test_db.pool())
            .await
            .unwrap();
        assert!(free);

        test_db.cleanup().await.unwrap();
    }
}
