//! PostgreSQL backend.

mod pool;
mod store;

pub use pool::{PgDatabase, PgPoolConnection};
pub use store::PgRecordStore;
