//! STRATA - batched database migrations
//!
//! Runs ordered, one-way migrations against every configured database and
//! records each applied migration with the batch it ran in.

mod runtime;

#[doc(hidden)]
pub use strata_core;

pub use strata_core::migration::{FnMigration, Migration};
pub use strata_runtime::migrations::SqlMigration;
pub use strata_runtime::PgPoolConnection;

// Assertion macros are #[macro_export]ed at the strata_core crate root.
#[cfg(feature = "testing")]
pub use strata_core::{assert_err_variant, assert_ok};

pub use runtime::prelude;
pub use runtime::{Strata, StrataBuilder};
