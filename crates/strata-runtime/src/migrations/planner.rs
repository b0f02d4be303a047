//! Batch planning.
//!
//! The next batch is always one past the highest recorded batch; an empty
//! record store yields batch 1.

use serde::Serialize;
use strata_core::error::{Result, StrataError};
use strata_core::migration::RecordStore;

use super::unit::MigrationUnit;

/// What a run would do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    /// Batch newly applied migrations would be recorded under.
    pub batch: i64,
    /// Unrecorded migrations, in registration order.
    pub pending: Vec<String>,
}

/// Compute the batch number for the run about to start.
pub async fn next_batch<C>(store: &dyn RecordStore<C>, conn: &mut C) -> Result<i64> {
    let latest = store.latest_batch(conn).await?;
    latest
        .checked_add(1)
        .ok_or_else(|| StrataError::store("latest_batch", "batch number overflow"))
}

/// Compute the next batch and the units it would apply.
pub async fn plan<C: Send + 'static>(
    units: &[MigrationUnit<C>],
    store: &dyn RecordStore<C>,
    conn: &mut C,
) -> Result<BatchPlan> {
    let batch = next_batch(store, conn).await?;

    let mut pending = Vec::new();
    for unit in units {
        if !store.has_record(unit.name(), conn).await? {
            pending.push(unit.name().to_string());
        }
    }

    Ok(BatchPlan { batch, pending })
}
