use std::time::Instant;

use strata_core::error::{Result, StrataError};
use strata_core::migration::{Migration, RecordStore};
use tracing::{debug, info};

/// Result of offering one unit to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The migration ran and its record was written.
    Applied,
    /// A record already existed; nothing ran.
    Skipped,
}

/// One registered migration together with its resolved identity.
pub struct MigrationUnit<C> {
    name: String,
    migration: Box<dyn Migration<C>>,
}

impl<C: Send + 'static> MigrationUnit<C> {
    pub fn new(migration: impl Migration<C>) -> Self {
        Self::from_boxed(Box::new(migration))
    }

    pub fn from_boxed(migration: Box<dyn Migration<C>>) -> Self {
        Self {
            name: migration.name().into_owned(),
            migration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the migration under `batch` unless the store already has a record for it.
    ///
    /// The record is written only after the migration succeeded, so a failed
    /// migration stays pending and is retried by the next run.
    pub async fn apply_if_needed(
        &self,
        batch: i64,
        store: &dyn RecordStore<C>,
        conn: &mut C,
    ) -> Result<UnitOutcome> {
        if store.has_record(&self.name, conn).await? {
            debug!(migration = %self.name, "Migration already applied, skipping");
            return Ok(UnitOutcome::Skipped);
        }

        info!(migration = %self.name, batch, "Applying migration");
        let start = Instant::now();

        self.migration
            .prepare(conn)
            .await
            .map_err(|e| StrataError::apply(self.name.as_str(), e))?;

        store.write_record(&self.name, batch, conn).await?;

        info!(
            migration = %self.name,
            batch,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Migration applied"
        );
        Ok(UnitOutcome::Applied)
    }
}

impl<C> std::fmt::Debug for MigrationUnit<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use strata_core::testing::{MemoryConnection, MemoryDatabase, MemoryRecordStore};
    use strata_core::Database;

    use super::*;

    struct CreateUsers;

    impl Migration<MemoryConnection> for CreateUsers {
        fn prepare<'a>(&'a self, conn: &'a mut MemoryConnection) -> BoxFuture<'a, Result<()>> {
            Box::pin(conn.execute("create table users"))
        }
    }

    struct Broken;

    impl Migration<MemoryConnection> for Broken {
        fn prepare<'a>(&'a self, _conn: &'a mut MemoryConnection) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(StrataError::Migration("syntax error".into())) })
        }
    }

    async fn ready(db: &MemoryDatabase, store: &MemoryRecordStore) -> MemoryConnection {
        let mut conn = db.make_connection().await.unwrap();
        store.ensure_schema_ready(&mut conn).await.unwrap();
        conn
    }

    #[test]
    fn test_unit_name_from_type() {
        let unit = MigrationUnit::new(CreateUsers);
        assert_eq!(unit.name(), "CreateUsers");
        assert!(format!("{:?}", unit).contains("CreateUsers"));
    }

    #[tokio::test]
    async fn test_apply_writes_record_after_migration() {
        let db = MemoryDatabase::new();
        let store = MemoryRecordStore::new();
        let mut conn = ready(&db, &store).await;

        let outcome = MigrationUnit::new(CreateUsers)
            .apply_if_needed(3, &store, &mut conn)
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Applied);
        assert_eq!(db.batch_of("CreateUsers"), Some(3));

        let journal = db.journal();
        let exec = journal.iter().position(|e| e == "exec:create table users");
        let record = journal.iter().position(|e| e == "record:CreateUsers@3");
        assert!(exec.unwrap() < record.unwrap());
    }

    #[tokio::test]
    async fn test_recorded_unit_is_skipped() {
        let db = MemoryDatabase::new();
        db.seed_record("CreateUsers", 1);
        let store = MemoryRecordStore::new();
        let mut conn = ready(&db, &store).await;

        let outcome = MigrationUnit::new(CreateUsers)
            .apply_if_needed(2, &store, &mut conn)
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Skipped);
        assert!(db.executed().is_empty());
        assert_eq!(db.batch_of("CreateUsers"), Some(1));
    }

    #[tokio::test]
    async fn test_failed_migration_writes_no_record() {
        let db = MemoryDatabase::new();
        let store = MemoryRecordStore::new();
        let mut conn = ready(&db, &store).await;

        let err = MigrationUnit::new(Broken)
            .apply_if_needed(1, &store, &mut conn)
            .await
            .unwrap_err();

        assert_eq!(err.failed_migration(), Some("Broken"));
        assert!(db.records().is_empty());
    }

    #[tokio::test]
    async fn test_record_write_failure_propagates() {
        let db = MemoryDatabase::new();
        let store = MemoryRecordStore::new();
        let mut conn = ready(&db, &store).await;
        db.fail_store_operation("write_record");

        let err = MigrationUnit::new(CreateUsers)
            .apply_if_needed(1, &store, &mut conn)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StrataError::Store {
                operation: "write_record",
                ..
            }
        ));
    }
}
