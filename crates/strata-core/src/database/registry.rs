use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::{Database, DatabaseId};
use crate::error::{Result, StrataError};

/// Entry in the database registry.
struct RegisteredDatabase {
    type_id: TypeId,
    type_name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

/// Registry of named database handles.
///
/// Entries are keyed by identifier and handle type. Asking for a name under a
/// different handle type than it was registered with is a miss, reported as
/// [`StrataError::DatabaseNotFound`].
#[derive(Default)]
pub struct Databases {
    storage: HashMap<String, RegisteredDatabase>,
}

impl Databases {
    pub fn builder() -> DatabasesBuilder {
        DatabasesBuilder::default()
    }

    /// Resolve a typed identifier to its handle.
    pub fn get<D: Database>(&self, id: &DatabaseId<D>) -> Result<Arc<D>> {
        let entry = self
            .storage
            .get(id.as_str())
            .ok_or_else(|| StrataError::DatabaseNotFound(id.to_string()))?;

        if entry.type_id != TypeId::of::<D>() {
            warn!(
                database = %id,
                registered = entry.type_name,
                requested = std::any::type_name::<D>(),
                "Database registered with a different handle type"
            );
            return Err(StrataError::DatabaseNotFound(id.to_string()));
        }

        entry
            .handle
            .clone()
            .downcast::<D>()
            .map_err(|_| StrataError::DatabaseNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

/// Builder for [`Databases`].
#[derive(Default)]
pub struct DatabasesBuilder {
    storage: HashMap<String, RegisteredDatabase>,
    duplicates: Vec<String>,
}

impl DatabasesBuilder {
    /// Register a database handle.
    pub fn register<D: Database>(self, id: &DatabaseId<D>, database: D) -> Self {
        self.register_shared(id, Arc::new(database))
    }

    /// Register a handle that is also held elsewhere.
    pub fn register_shared<D: Database>(mut self, id: &DatabaseId<D>, database: Arc<D>) -> Self {
        let name = id.as_str().to_string();
        if self.storage.contains_key(&name) {
            self.duplicates.push(name);
            return self;
        }

        self.storage.insert(
            name,
            RegisteredDatabase {
                type_id: TypeId::of::<D>(),
                type_name: std::any::type_name::<D>(),
                handle: database,
            },
        );
        self
    }

    /// Finish registration. Fails if any identifier was registered twice.
    pub fn build(self) -> Result<Databases> {
        if !self.duplicates.is_empty() {
            return Err(StrataError::Config(format!(
                "Database registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }

        Ok(Databases {
            storage: self.storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;

    struct Alpha;
    struct Beta;

    impl Database for Alpha {
        type Connection = ();

        fn make_connection(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    impl Database for Beta {
        type Connection = ();

        fn make_connection(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_empty_registry() {
        let databases = Databases::builder().build().unwrap();
        assert!(databases.is_empty());
        assert_eq!(databases.len(), 0);

        let id: DatabaseId<Alpha> = DatabaseId::new("primary");
        assert!(matches!(
            databases.get(&id),
            Err(StrataError::DatabaseNotFound(name)) if name == "primary"
        ));
    }

    #[test]
    fn test_get_registered() {
        let id: DatabaseId<Alpha> = DatabaseId::new("primary");
        let databases = Databases::builder().register(&id, Alpha).build().unwrap();

        assert!(databases.get(&id).is_ok());
        assert_eq!(databases.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_not_found() {
        let alpha: DatabaseId<Alpha> = DatabaseId::new("primary");
        let beta: DatabaseId<Beta> = DatabaseId::new("primary");
        let databases = Databases::builder().register(&alpha, Alpha).build().unwrap();

        assert!(matches!(
            databases.get(&beta),
            Err(StrataError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let alpha: DatabaseId<Alpha> = DatabaseId::new("primary");
        let beta: DatabaseId<Beta> = DatabaseId::new("primary");

        let result = Databases::builder()
            .register(&alpha, Alpha)
            .register(&beta, Beta)
            .build();

        assert!(matches!(result, Err(StrataError::Config(m)) if m.contains("primary")));
    }
}
