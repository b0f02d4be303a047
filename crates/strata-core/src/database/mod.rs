//! Database handles and their typed identifiers.
//!
//! A [`Database`] is anything that can hand out connections. Handles are
//! registered under a [`DatabaseId`] in a [`Databases`] registry, and the
//! identifier carries the handle type so lookups are checked at compile time.

mod registry;

pub use registry::{Databases, DatabasesBuilder};

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use futures::future::BoxFuture;

use crate::error::Result;

/// A database handle capable of producing connections.
pub trait Database: Send + Sync + 'static {
    /// Connection type handed to record stores and migrations.
    ///
    /// Dropping the connection releases it.
    type Connection: Send + 'static;

    /// Acquire a connection.
    fn make_connection(&self) -> BoxFuture<'_, Result<Self::Connection>>;
}

/// Identifier for a registered database of type `D`.
pub struct DatabaseId<D> {
    name: Cow<'static, str>,
    _database: PhantomData<fn() -> D>,
}

impl<D> DatabaseId<D> {
    /// Identifier usable in `const` and `static` items.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _database: PhantomData,
        }
    }

    /// Identifier built at runtime, e.g. from configuration.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _database: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl<D> Clone for DatabaseId<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _database: PhantomData,
        }
    }
}

impl<D> PartialEq for DatabaseId<D> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<D> Eq for DatabaseId<D> {}

impl<D> fmt::Debug for DatabaseId<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatabaseId")
            .field(&self.name)
            .field(&std::any::type_name::<D>())
            .finish()
    }
}

impl<D> fmt::Display for DatabaseId<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
