//! Testing utilities for STRATA migrations.
//!
//! - [`MemoryDatabase`] / [`MemoryRecordStore`]: an in-process database with a
//!   journal of every connection, statement and record write, plus failure
//!   injection, for testing runs without a server.
//! - [`TestDatabase`]: isolated PostgreSQL databases for tests that opt in via
//!   `TEST_DATABASE_URL`.
//! - `assert_ok!` / `assert_err_variant!` macros.

pub mod assertions;
pub mod db;
pub mod memory;

pub use assertions::*;
pub use db::{IsolatedTestDb, TestDatabase};
pub use memory::{MemoryConnection, MemoryDatabase, MemoryRecordStore};
