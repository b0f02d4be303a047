//! Per-database migration runner.
//!
//! A run resolves the database, holds one connection for its whole duration,
//! computes the next batch and offers every registered migration to it in
//! registration order. The first failure ends the run; migrations after it are
//! never attempted.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use strata_core::database::{Database, DatabaseId, Databases};
use strata_core::error::{Result, StrataError};
use strata_core::migration::{Migration, MigrationRecord, RecordStore};
use tracing::{debug, error, info, warn};

use super::planner;
use super::unit::{MigrationUnit, UnitOutcome};

/// Outcome of one successful run against one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Database identifier.
    pub database: String,
    /// Batch newly applied migrations were recorded under.
    pub batch: i64,
    /// Migrations applied by this run, in order.
    pub applied: Vec<String>,
    /// Migrations that already had a record.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    fn new(database: &str, batch: i64) -> Self {
        Self {
            database: database.to_string(),
            batch,
            applied: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// True when the run applied nothing.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applied and pending migrations of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Database identifier.
    pub database: String,
    /// Batch the next run would use.
    pub next_batch: i64,
    /// Records currently in the store.
    pub applied: Vec<MigrationRecord>,
    /// Registered migrations without a record, in registration order.
    pub pending: Vec<String>,
}

/// Object-safe view of a [`DatabaseMigrations`], whatever its database type.
pub trait MigrationRunnable: Send + Sync {
    /// Identifier of the database the migrations belong to.
    fn database_name(&self) -> &str;

    /// Registered migration names, in run order.
    fn migration_names(&self) -> Vec<&str>;

    /// Run pending migrations.
    fn migrate<'a>(&'a self, databases: &'a Databases) -> BoxFuture<'a, Result<MigrationReport>>;

    /// Report applied and pending migrations without applying anything.
    fn status<'a>(&'a self, databases: &'a Databases) -> BoxFuture<'a, Result<MigrationStatus>>;
}

/// Ordered migrations for a single database, with the store that records them.
///
/// Built once through [`DatabaseMigrations::builder`]; the sequence cannot be
/// changed afterwards.
pub struct DatabaseMigrations<D: Database> {
    database: DatabaseId<D>,
    store: Arc<dyn RecordStore<D::Connection>>,
    units: Vec<MigrationUnit<D::Connection>>,
}

impl<D: Database> DatabaseMigrations<D> {
    pub fn builder(
        database: DatabaseId<D>,
        store: impl RecordStore<D::Connection> + 'static,
    ) -> DatabaseMigrationsBuilder<D> {
        DatabaseMigrationsBuilder {
            database,
            store: Arc::new(store),
            units: Vec::new(),
        }
    }

    pub fn database(&self) -> &DatabaseId<D> {
        &self.database
    }

    /// Registered migration names, in run order.
    pub fn migration_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.name())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run every pending migration of this database under one new batch.
    pub async fn migrate(&self, databases: &Databases) -> Result<MigrationReport> {
        let database = databases.get(&self.database)?;

        let mut conn = database
            .make_connection()
            .await
            .map_err(StrataError::into_connection_error)?;
        debug!(database = %self.database, "Connection acquired");

        self.store.lock(&mut conn).await?;

        let result = self.migrate_on(&mut conn).await;

        // Always unlock, even when the run failed
        if let Err(e) = self.store.unlock(&mut conn).await {
            warn!(database = %self.database, error = %e, "Failed to release migration lock");
        }

        match &result {
            Ok(report) if report.is_noop() => {
                info!(database = %self.database, "No pending migrations");
            }
            Ok(report) => {
                info!(
                    database = %self.database,
                    batch = report.batch,
                    applied = report.applied.len(),
                    "Migration batch complete"
                );
            }
            Err(e) => {
                error!(database = %self.database, error = %e, "Migration run failed");
            }
        }

        result
    }

    /// Run pending migrations on a connection the caller already holds.
    ///
    /// Takes no lock; callers coordinating concurrent runs must do so themselves.
    pub async fn migrate_on(&self, conn: &mut D::Connection) -> Result<MigrationReport> {
        self.store.ensure_schema_ready(conn).await?;

        let batch = planner::next_batch(self.store.as_ref(), conn).await?;
        debug!(database = %self.database, batch, "Computed next batch");

        let mut report = MigrationReport::new(self.database.as_str(), batch);
        for unit in &self.units {
            match unit.apply_if_needed(batch, self.store.as_ref(), conn).await? {
                UnitOutcome::Applied => report.applied.push(unit.name().to_string()),
                UnitOutcome::Skipped => report.skipped.push(unit.name().to_string()),
            }
        }

        Ok(report)
    }

    /// Report applied and pending migrations without applying anything.
    pub async fn status(&self, databases: &Databases) -> Result<MigrationStatus> {
        let database = databases.get(&self.database)?;

        let mut conn = database
            .make_connection()
            .await
            .map_err(StrataError::into_connection_error)?;

        self.store.ensure_schema_ready(&mut conn).await?;
        let plan = planner::plan(&self.units, self.store.as_ref(), &mut conn).await?;
        let applied = self.store.applied(&mut conn).await?;

        Ok(MigrationStatus {
            database: self.database.to_string(),
            next_batch: plan.batch,
            applied,
            pending: plan.pending,
        })
    }
}

impl<D: Database> MigrationRunnable for DatabaseMigrations<D> {
    fn database_name(&self) -> &str {
        self.database.as_str()
    }

    fn migration_names(&self) -> Vec<&str> {
        DatabaseMigrations::migration_names(self).collect()
    }

    fn migrate<'a>(&'a self, databases: &'a Databases) -> BoxFuture<'a, Result<MigrationReport>> {
        Box::pin(DatabaseMigrations::migrate(self, databases))
    }

    fn status<'a>(&'a self, databases: &'a Databases) -> BoxFuture<'a, Result<MigrationStatus>> {
        Box::pin(DatabaseMigrations::status(self, databases))
    }
}

/// Builder for [`DatabaseMigrations`].
pub struct DatabaseMigrationsBuilder<D: Database> {
    database: DatabaseId<D>,
    store: Arc<dyn RecordStore<D::Connection>>,
    units: Vec<MigrationUnit<D::Connection>>,
}

impl<D: Database> DatabaseMigrationsBuilder<D> {
    /// Append a migration. Migrations run in the order they are added.
    pub fn add(mut self, migration: impl Migration<D::Connection>) -> Self {
        self.units.push(MigrationUnit::new(migration));
        self
    }

    /// Append several migrations, keeping their order.
    pub fn add_all<M, I>(mut self, migrations: I) -> Self
    where
        M: Migration<D::Connection>,
        I: IntoIterator<Item = M>,
    {
        self.units
            .extend(migrations.into_iter().map(MigrationUnit::new));
        self
    }

    /// Append an already wrapped unit.
    pub fn add_unit(mut self, unit: MigrationUnit<D::Connection>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn build(self) -> DatabaseMigrations<D> {
        DatabaseMigrations {
            database: self.database,
            store: self.store,
            units: self.units,
        }
    }
}
