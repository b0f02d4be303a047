pub mod db;
pub mod migrations;

pub use db::{PgDatabase, PgPoolConnection, PgRecordStore};
pub use migrations::{
    load_migrations_from_dir, DatabaseMigrations, MigrationConfig, MigrationReport,
    MigrationRunnable, MigrationStatus, SqlMigration,
};
