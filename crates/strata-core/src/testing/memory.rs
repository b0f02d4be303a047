//! In-memory database for exercising migration runs without PostgreSQL.
//!
//! Every observable step (connection acquisition, executed statements, record
//! writes, locking and release) is appended to a shared journal so tests can
//! assert on ordering. Failures can be injected per store operation, per
//! statement and for connection acquisition.
//!
//! # Example
//!
//! ```ignore
//! let db = MemoryDatabase::new();
//! db.seed_record("CreateUsers", 5);
//! db.fail_store_operation("write_record");
//!
//! // ... run migrations ...
//!
//! assert_eq!(db.connections_opened(), db.connections_released());
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::BoxFuture;

use crate::database::Database;
use crate::error::{Result, StrataError};
use crate::migration::{MigrationRecord, RecordStore, NO_BATCH};

#[derive(Default)]
struct MemoryState {
    schema_ready: bool,
    records: Vec<MigrationRecord>,
    journal: Vec<String>,
    opened: usize,
    released: usize,
    locked: bool,
    connect_failure: Option<String>,
    failing_operations: HashSet<&'static str>,
    failing_statements: Vec<String>,
}

/// Shared in-memory database handle. Clones observe the same state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Make every subsequent connection attempt fail with `message`.
    pub fn fail_connections(&self, message: impl Into<String>) {
        self.state().connect_failure = Some(message.into());
    }

    /// Make a record store operation fail, e.g. `"latest_batch"`.
    pub fn fail_store_operation(&self, operation: &'static str) {
        self.state().failing_operations.insert(operation);
    }

    /// Make any executed statement containing `needle` fail.
    pub fn fail_statements_containing(&self, needle: impl Into<String>) {
        self.state().failing_statements.push(needle.into());
    }

    /// Insert a record as if a previous run had applied `name` in `batch`.
    pub fn seed_record(&self, name: &str, batch: i64) {
        let mut state = self.state();
        state.schema_ready = true;
        state.records.push(MigrationRecord {
            name: name.to_string(),
            batch,
            applied_at: Utc::now(),
        });
    }

    /// All records, in write order.
    pub fn records(&self) -> Vec<MigrationRecord> {
        self.state().records.clone()
    }

    /// Names of all recorded migrations, in write order.
    pub fn recorded_names(&self) -> Vec<String> {
        self.state().records.iter().map(|r| r.name.clone()).collect()
    }

    /// Batch recorded for `name`, if any.
    pub fn batch_of(&self, name: &str) -> Option<i64> {
        self.state()
            .records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.batch)
    }

    pub fn latest_batch(&self) -> i64 {
        self.state()
            .records
            .iter()
            .map(|r| r.batch)
            .max()
            .unwrap_or(NO_BATCH)
    }

    /// Whether the record table has been created.
    pub fn schema_ready(&self) -> bool {
        self.state().schema_ready
    }

    /// Every journaled event, in order.
    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    /// Statements executed through [`MemoryConnection::execute`], in order.
    pub fn executed(&self) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|e| e.strip_prefix("exec:").map(str::to_string))
            .collect()
    }

    pub fn connections_opened(&self) -> usize {
        self.state().opened
    }

    pub fn connections_released(&self) -> usize {
        self.state().released
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }
}

impl Database for MemoryDatabase {
    type Connection = MemoryConnection;

    fn make_connection(&self) -> BoxFuture<'_, Result<MemoryConnection>> {
        Box::pin(async move {
            tokio::task::yield_now().await;

            let mut state = self.state();
            if let Some(message) = &state.connect_failure {
                return Err(StrataError::Connection(message.clone()));
            }
            state.opened += 1;
            state.journal.push("connect".to_string());
            drop(state);

            Ok(MemoryConnection {
                state: self.state.clone(),
            })
        })
    }
}

/// Connection to a [`MemoryDatabase`]. Dropping it releases the connection.
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnection {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Execute a statement.
    pub async fn execute(&mut self, statement: &str) -> Result<()> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        if state
            .failing_statements
            .iter()
            .any(|needle| statement.contains(needle.as_str()))
        {
            return Err(StrataError::Database(format!(
                "statement failed: {}",
                statement
            )));
        }
        state.journal.push(format!("exec:{}", statement));
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.released += 1;
            state.journal.push("release".to_string());
        }
    }
}

/// Record store kept inside a [`MemoryDatabase`].
///
/// Without [`with_lock`](Self::with_lock) concurrent runs are not coordinated.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    locking: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose lock hook refuses a second holder.
    pub fn with_lock() -> Self {
        Self { locking: true }
    }
}

/// Check injected failures and table existence before a store operation.
fn check(state: &MemoryState, operation: &'static str, needs_table: bool) -> Result<()> {
    if state.failing_operations.contains(operation) {
        return Err(StrataError::store(operation, "injected failure"));
    }
    if needs_table && !state.schema_ready {
        return Err(StrataError::store(operation, "record table does not exist"));
    }
    Ok(())
}

impl RecordStore<MemoryConnection> for MemoryRecordStore {
    fn ensure_schema_ready<'a>(
        &'a self,
        conn: &'a mut MemoryConnection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = conn.state();
            check(&state, "ensure_schema_ready", false)?;
            state.schema_ready = true;
            Ok(())
        })
    }

    fn latest_batch<'a>(&'a self, conn: &'a mut MemoryConnection) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let state = conn.state();
            check(&state, "latest_batch", true)?;
            Ok(state
                .records
                .iter()
                .map(|r| r.batch)
                .max()
                .unwrap_or(NO_BATCH))
        })
    }

    fn has_record<'a>(
        &'a self,
        name: &'a str,
        conn: &'a mut MemoryConnection,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let state = conn.state();
            check(&state, "has_record", true)?;
            Ok(state.records.iter().any(|r| r.name == name))
        })
    }

    fn write_record<'a>(
        &'a self,
        name: &'a str,
        batch: i64,
        conn: &'a mut MemoryConnection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = conn.state();
            check(&state, "write_record", true)?;
            if state.records.iter().any(|r| r.name == name) {
                return Err(StrataError::store(
                    "write_record",
                    format!("duplicate record for {}", name),
                ));
            }
            state.records.push(MigrationRecord {
                name: name.to_string(),
                batch,
                applied_at: Utc::now(),
            });
            state.journal.push(format!("record:{}@{}", name, batch));
            Ok(())
        })
    }

    fn applied<'a>(
        &'a self,
        conn: &'a mut MemoryConnection,
    ) -> BoxFuture<'a, Result<Vec<MigrationRecord>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let state = conn.state();
            check(&state, "applied", true)?;
            let mut records = state.records.clone();
            records.sort_by_key(|r| r.batch);
            Ok(records)
        })
    }

    fn lock<'a>(&'a self, conn: &'a mut MemoryConnection) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.locking {
                return Ok(());
            }
            let mut state = conn.state();
            check(&state, "lock", false)?;
            if state.locked {
                return Err(StrataError::store("lock", "already locked"));
            }
            state.locked = true;
            state.journal.push("lock".to_string());
            Ok(())
        })
    }

    fn unlock<'a>(&'a self, conn: &'a mut MemoryConnection) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.locking {
                return Ok(());
            }
            let mut state = conn.state();
            check(&state, "unlock", false)?;
            state.locked = false;
            state.journal.push("unlock".to_string());
            Ok(())
        })
    }
}
