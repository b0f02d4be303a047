//! Embedding API.
//!
//! [`Strata`] runs the same migrations as the `strata` binary: every
//! configured database gets its `.sql` files plus any migrations registered
//! in code, recorded in the configured record table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use strata_core::config::StrataConfig;
use strata_core::database::{DatabaseId, Databases};
use strata_core::error::{Result, StrataError};
use strata_core::migration::Migration;
use strata_runtime::db::{PgDatabase, PgPoolConnection, PgRecordStore};
use strata_runtime::migrations::{
    load_migrations_from_dir, DatabaseMigrations, MigrationConfig, MigrationReport,
    MigrationStatus, MigrationUnit,
};
use tracing::info;

/// Prelude module for common imports.
pub mod prelude {
    pub use strata_core::config::StrataConfig;
    pub use strata_core::error::{Result, StrataError};
    pub use strata_core::migration::{FnMigration, Migration};
    pub use strata_runtime::db::PgPoolConnection;
    pub use strata_runtime::migrations::{MigrationReport, MigrationStatus, SqlMigration};

    pub use crate::{Strata, StrataBuilder};
}

/// Migration runner for every database of a configuration.
pub struct Strata {
    config: StrataConfig,
    migrations: MigrationConfig,
}

impl Strata {
    pub fn builder() -> StrataBuilder {
        StrataBuilder::new()
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn migrations(&self) -> &MigrationConfig {
        &self.migrations
    }

    /// Run pending migrations of every configured database, in identifier order.
    pub async fn migrate(&self) -> Result<Vec<MigrationReport>> {
        let pools = self.connect(None).await?;
        let result = self.migrations.migrate(&pools.databases).await;
        pools.close().await;
        result
    }

    /// Run pending migrations of one configured database.
    pub async fn migrate_database(&self, id: &str) -> Result<MigrationReport> {
        let pools = self.connect(Some(id)).await?;
        let result = self.migrations.migrate_database(id, &pools.databases).await;
        pools.close().await;
        result
    }

    /// Applied and pending migrations of every configured database.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let pools = self.connect(None).await?;
        let result = self.migrations.status(&pools.databases).await;
        pools.close().await;
        result
    }

    /// Applied and pending migrations of one configured database.
    pub async fn status_of(&self, id: &str) -> Result<MigrationStatus> {
        let pools = self.connect(Some(id)).await?;
        let result = self.migrations.status_of(id, &pools.databases).await;
        pools.close().await;
        result
    }

    async fn connect(&self, only: Option<&str>) -> Result<Pools> {
        let selected: Vec<(&String, _)> = match only {
            Some(id) => {
                let (key, db) = self
                    .config
                    .databases
                    .get_key_value(id)
                    .ok_or_else(|| StrataError::DatabaseNotFound(id.to_string()))?;
                vec![(key, db)]
            }
            None => self.config.databases.iter().collect(),
        };

        let mut handles: Vec<PgDatabase> = Vec::with_capacity(selected.len());
        for (id, db_config) in &selected {
            match PgDatabase::from_config(db_config).await {
                Ok(db) => {
                    info!(database = %id, "Connected to database");
                    handles.push(db);
                }
                Err(e) => {
                    close_all(&handles).await;
                    return Err(in_database(id, e));
                }
            }
        }

        let databases = selected
            .iter()
            .zip(&handles)
            .fold(Databases::builder(), |builder, ((id, _), db)| {
                builder.register(&DatabaseId::<PgDatabase>::named(id.as_str()), db.clone())
            })
            .build();

        match databases {
            Ok(databases) => Ok(Pools { databases, handles }),
            Err(e) => {
                close_all(&handles).await;
                Err(e)
            }
        }
    }
}

/// Name the database a connection failure belongs to, keeping its kind.
fn in_database(id: &str, error: StrataError) -> StrataError {
    match error {
        StrataError::Connection(message) => {
            StrataError::Connection(format!("Database '{}': {}", id, message))
        }
        other => other,
    }
}

async fn close_all(handles: &[PgDatabase]) {
    for handle in handles {
        handle.close().await;
    }
}

/// Connected pools for the duration of one call.
struct Pools {
    databases: Databases,
    handles: Vec<PgDatabase>,
}

impl Pools {
    async fn close(self) {
        close_all(&self.handles).await;
    }
}

/// Builder for configuring [`Strata`].
#[derive(Default)]
pub struct StrataBuilder {
    config: Option<StrataConfig>,
    config_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    extra_migrations: BTreeMap<String, Vec<MigrationUnit<PgPoolConnection>>>,
}

impl StrataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already loaded configuration.
    pub fn config(mut self, config: StrataConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a TOML file at build time.
    ///
    /// Relative migration directories are resolved against the file's directory.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Directory relative migration directories are resolved against.
    ///
    /// Defaults to the directory of [`config_file`](Self::config_file), or the
    /// working directory for an already loaded configuration.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Register a code-defined migration for database `database`.
    ///
    /// Code-defined migrations run after the database's `.sql` files, in the
    /// order they were registered.
    pub fn migration(
        mut self,
        database: impl Into<String>,
        migration: impl Migration<PgPoolConnection>,
    ) -> Self {
        self.extra_migrations
            .entry(database.into())
            .or_default()
            .push(MigrationUnit::new(migration));
        self
    }

    pub fn build(mut self) -> Result<Strata> {
        let (config, base_dir) = match (self.config_path.take(), self.config.take()) {
            (Some(path), _) => {
                let config = StrataConfig::from_file(&path)?;
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (config, base)
            }
            (None, Some(config)) => (config, PathBuf::new()),
            (None, None) => {
                return Err(StrataError::Config(
                    "No configuration provided; use config() or config_file()".into(),
                ))
            }
        };

        let base_dir = self.base_dir.take().unwrap_or(base_dir);

        if let Some(unknown) = self
            .extra_migrations
            .keys()
            .find(|id| !config.databases.contains_key(*id))
        {
            return Err(StrataError::Config(format!(
                "Migration registered for unknown database '{}'",
                unknown
            )));
        }

        let mut migrations = MigrationConfig::builder();
        for (id, db_config) in &config.databases {
            let dir = base_dir.join(&db_config.migrations_dir);
            let sql = load_migrations_from_dir(&dir)?;
            info!(database = %id, count = sql.len(), dir = %dir.display(), "Loaded SQL migrations");

            let store = PgRecordStore::from_config(&config.migrations)?;
            let mut database =
                DatabaseMigrations::builder(DatabaseId::<PgDatabase>::named(id.as_str()), store)
                    .add_all(sql);
            for unit in self.extra_migrations.remove(id).unwrap_or_default() {
                database = database.add_unit(unit);
            }
            migrations = migrations.database(database.build());
        }

        Ok(Strata {
            config,
            migrations: migrations.build()?,
        })
    }
}
