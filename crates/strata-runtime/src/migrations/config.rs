use std::collections::HashSet;

use strata_core::database::{Database, Databases};
use strata_core::error::{Result, StrataError};
use tracing::info;

use super::runner::{DatabaseMigrations, MigrationReport, MigrationRunnable, MigrationStatus};

/// Migrations for every database of an application.
///
/// Databases are migrated one after another in the order they were added,
/// and the first failing database stops the run.
pub struct MigrationConfig {
    databases: Vec<Box<dyn MigrationRunnable>>,
}

impl MigrationConfig {
    pub fn builder() -> MigrationConfigBuilder {
        MigrationConfigBuilder::default()
    }

    /// Identifiers of the configured databases, in run order.
    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.iter().map(|d| d.database_name())
    }

    /// Registered migration names of one database, in run order.
    pub fn migrations_of(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self.find(name)?.migration_names())
    }

    /// Run pending migrations of every configured database.
    pub async fn migrate(&self, databases: &Databases) -> Result<Vec<MigrationReport>> {
        let mut reports = Vec::with_capacity(self.databases.len());
        for runnable in &self.databases {
            reports.push(runnable.migrate(databases).await?);
        }

        let applied: usize = reports.iter().map(|r| r.applied.len()).sum();
        info!(databases = reports.len(), applied, "Migrations completed");
        Ok(reports)
    }

    /// Run pending migrations of a single configured database.
    pub async fn migrate_database(
        &self,
        name: &str,
        databases: &Databases,
    ) -> Result<MigrationReport> {
        self.find(name)?.migrate(databases).await
    }

    /// Status of every configured database.
    pub async fn status(&self, databases: &Databases) -> Result<Vec<MigrationStatus>> {
        let mut statuses = Vec::with_capacity(self.databases.len());
        for runnable in &self.databases {
            statuses.push(runnable.status(databases).await?);
        }
        Ok(statuses)
    }

    /// Status of a single configured database.
    pub async fn status_of(&self, name: &str, databases: &Databases) -> Result<MigrationStatus> {
        self.find(name)?.status(databases).await
    }

    fn find(&self, name: &str) -> Result<&dyn MigrationRunnable> {
        self.databases
            .iter()
            .find(|d| d.database_name() == name)
            .map(|d| d.as_ref())
            .ok_or_else(|| StrataError::DatabaseNotFound(name.to_string()))
    }
}

/// Builder for [`MigrationConfig`].
#[derive(Default)]
pub struct MigrationConfigBuilder {
    databases: Vec<Box<dyn MigrationRunnable>>,
}

impl MigrationConfigBuilder {
    /// Add the migrations of one database.
    pub fn database<D: Database>(mut self, migrations: DatabaseMigrations<D>) -> Self {
        self.databases.push(Box::new(migrations));
        self
    }

    /// Finish configuration. Each database may be configured only once.
    pub fn build(self) -> Result<MigrationConfig> {
        let mut seen = HashSet::new();
        for runnable in &self.databases {
            if !seen.insert(runnable.database_name()) {
                return Err(StrataError::Config(format!(
                    "Migrations for database '{}' configured more than once",
                    runnable.database_name()
                )));
            }
        }

        Ok(MigrationConfig {
            databases: self.databases,
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_core::database::DatabaseId;
    use strata_core::testing::{MemoryConnection, MemoryDatabase, MemoryRecordStore};
    use strata_core::{assert_err_variant, FnMigration};

    use super::*;

    const PRIMARY: DatabaseId<MemoryDatabase> = DatabaseId::new("primary");
    const ANALYTICS: DatabaseId<MemoryDatabase> = DatabaseId::new("analytics");

    fn exec(
        name: &'static str,
        statement: &'static str,
    ) -> impl strata_core::Migration<MemoryConnection> {
        FnMigration::new(name, move |conn: &mut MemoryConnection| {
            Box::pin(conn.execute(statement))
        })
    }

    fn registry(primary: &MemoryDatabase, analytics: &MemoryDatabase) -> Databases {
        Databases::builder()
            .register(&PRIMARY, primary.clone())
            .register(&ANALYTICS, analytics.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrates_each_database_in_order() {
        let primary = MemoryDatabase::new();
        let analytics = MemoryDatabase::new();
        let databases = registry(&primary, &analytics);

        let config = MigrationConfig::builder()
            .database(
                DatabaseMigrations::builder(PRIMARY, MemoryRecordStore::new())
                    .add(exec("create_users", "create table users"))
                    .build(),
            )
            .database(
                DatabaseMigrations::builder(ANALYTICS, MemoryRecordStore::new())
                    .add(exec("create_events", "create table events"))
                    .build(),
            )
            .build()
            .unwrap();

        let reports = config.migrate(&databases).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].database, "primary");
        assert_eq!(reports[1].database, "analytics");
        assert_eq!(primary.executed(), vec!["create table users"]);
        assert_eq!(analytics.executed(), vec!["create table events"]);
        assert_eq!(
            config.database_names().collect::<Vec<_>>(),
            vec!["primary", "analytics"]
        );
    }

    #[tokio::test]
    async fn test_failing_database_stops_the_run() {
        let primary = MemoryDatabase::new();
        let analytics = MemoryDatabase::new();
        primary.fail_statements_containing("users");
        let databases = registry(&primary, &analytics);

        let config = MigrationConfig::builder()
            .database(
                DatabaseMigrations::builder(PRIMARY, MemoryRecordStore::new())
                    .add(exec("create_users", "create table users"))
                    .build(),
            )
            .database(
                DatabaseMigrations::builder(ANALYTICS, MemoryRecordStore::new())
                    .add(exec("create_events", "create table events"))
                    .build(),
            )
            .build()
            .unwrap();

        let err = config.migrate(&databases).await.unwrap_err();

        assert_eq!(err.failed_migration(), Some("create_users"));
        assert_eq!(analytics.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_migrate_single_database() {
        let primary = MemoryDatabase::new();
        let analytics = MemoryDatabase::new();
        let databases = registry(&primary, &analytics);

        let config = MigrationConfig::builder()
            .database(
                DatabaseMigrations::builder(PRIMARY, MemoryRecordStore::new())
                    .add(exec("create_users", "create table users"))
                    .build(),
            )
            .database(
                DatabaseMigrations::builder(ANALYTICS, MemoryRecordStore::new())
                    .add(exec("create_events", "create table events"))
                    .build(),
            )
            .build()
            .unwrap();

        let report = config.migrate_database("analytics", &databases).await.unwrap();
        assert_eq!(report.applied, vec!["create_events"]);
        assert_eq!(primary.connections_opened(), 0);

        let result = config.migrate_database("replica", &databases).await;
        assert_err_variant!(result, StrataError::DatabaseNotFound(_));

        assert_eq!(config.migrations_of("primary").unwrap(), vec!["create_users"]);

        let status = config.status_of("primary", &databases).await.unwrap();
        assert_eq!(status.pending, vec!["create_users"]);
    }

    #[test]
    fn test_duplicate_database_rejected() {
        let result = MigrationConfig::builder()
            .database(DatabaseMigrations::builder(PRIMARY, MemoryRecordStore::new()).build())
            .database(DatabaseMigrations::builder(PRIMARY, MemoryRecordStore::new()).build())
            .build();

        assert!(matches!(result, Err(StrataError::Config(m)) if m.contains("primary")));
    }
}
