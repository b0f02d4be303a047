//! Batched migration runs.

mod config;
mod planner;
mod runner;
mod sql;
mod unit;

pub use config::{MigrationConfig, MigrationConfigBuilder};
pub use planner::{next_batch, plan, BatchPlan};
pub use runner::{
    DatabaseMigrations, DatabaseMigrationsBuilder, MigrationReport, MigrationRunnable,
    MigrationStatus,
};
pub use sql::{load_migrations_from_dir, split_sql_statements, SqlMigration};
pub use unit::{MigrationUnit, UnitOutcome};
