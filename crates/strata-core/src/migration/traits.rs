use std::borrow::Cow;
use std::marker::PhantomData;

use futures::future::BoxFuture;

use crate::error::Result;

/// A named, one-way schema or data change applied on a connection of type `C`.
///
/// The runner guarantees `prepare` is invoked at most once per identity: once it
/// succeeds a record is written and later runs skip the migration.
pub trait Migration<C>: Send + Sync + 'static {
    /// Stable identity used to detect whether the migration already ran.
    ///
    /// Defaults to the name of the implementing type.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(type_identity::<Self>())
    }

    /// Apply the change.
    fn prepare<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, Result<()>>;
}

/// Identity derived from a type: its name without module path or generics.
pub fn type_identity<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Migration backed by a closure.
pub struct FnMigration<C, F> {
    name: Cow<'static, str>,
    prepare: F,
    _connection: PhantomData<fn(&mut C)>,
}

impl<C: 'static, F> FnMigration<C, F> {
    pub fn new(name: impl Into<Cow<'static, str>>, prepare: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            prepare,
            _connection: PhantomData,
        }
    }
}

impl<C, F> Migration<C> for FnMigration<C, F>
where
    C: 'static,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn prepare<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, Result<()>> {
        (self.prepare)(conn)
    }
}
