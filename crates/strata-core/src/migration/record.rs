use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Batch number meaning "nothing has ever been applied".
pub const NO_BATCH: i64 = 0;

/// One applied migration, as persisted in the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration identity.
    pub name: String,
    /// Batch the migration was applied in.
    pub batch: i64,
    /// When the record was written.
    pub applied_at: DateTime<Utc>,
}

/// Persistent log of applied migrations on connections of type `C`.
///
/// Failures of the underlying connection surface as
/// [`StrataError::Store`](crate::StrataError::Store) and are never retried.
pub trait RecordStore<C>: Send + Sync {
    /// Create the record table if it does not exist yet.
    fn ensure_schema_ready<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, Result<()>>;

    /// Highest recorded batch, or [`NO_BATCH`] when the log is empty.
    fn latest_batch<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, Result<i64>>;

    /// Whether a record exists for `name`.
    fn has_record<'a>(&'a self, name: &'a str, conn: &'a mut C) -> BoxFuture<'a, Result<bool>>;

    /// Append a record. Only called once the migration has fully succeeded.
    fn write_record<'a>(
        &'a self,
        name: &'a str,
        batch: i64,
        conn: &'a mut C,
    ) -> BoxFuture<'a, Result<()>>;

    /// All records, ordered by batch and then by write order.
    fn applied<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, Result<Vec<MigrationRecord>>>;

    /// Take exclusive ownership of the log for the duration of one run.
    fn lock<'a>(&'a self, _conn: &'a mut C) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Give up ownership taken by [`lock`](Self::lock).
    fn unlock<'a>(&'a self, _conn: &'a mut C) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
