mod record;
mod traits;

pub use record::{MigrationRecord, RecordStore, NO_BATCH};
pub use traits::{type_identity, FnMigration, Migration};
