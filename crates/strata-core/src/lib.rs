pub mod config;
pub mod database;
pub mod error;
pub mod migration;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::StrataConfig;
pub use database::{Database, DatabaseId, Databases, DatabasesBuilder};
pub use error::{Result, StrataError};
pub use migration::{FnMigration, Migration, MigrationRecord, RecordStore, NO_BATCH};
