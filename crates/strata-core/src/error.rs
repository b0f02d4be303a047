use std::fmt::Display;

use thiserror::Error;

/// Core error type for STRATA operations.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("No database '{0}' was found for migrations")]
    DatabaseNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record store error during {operation}: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    #[error("Migration '{migration}' failed: {source}")]
    Apply {
        migration: String,
        #[source]
        source: Box<StrataError>,
    },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl StrataError {
    /// Wrap an underlying failure of a record store operation.
    pub fn store(operation: &'static str, cause: impl Display) -> Self {
        StrataError::Store {
            operation,
            message: cause.to_string(),
        }
    }

    /// Attribute a failed apply-operation to the migration that raised it.
    pub fn apply(migration: impl Into<String>, cause: StrataError) -> Self {
        StrataError::Apply {
            migration: migration.into(),
            source: Box::new(cause),
        }
    }

    /// Normalize any failure raised while acquiring a connection.
    pub fn into_connection_error(self) -> Self {
        match self {
            StrataError::Connection(_) => self,
            other => StrataError::Connection(other.to_string()),
        }
    }

    /// Name of the migration that failed, if this is an apply failure.
    pub fn failed_migration(&self) -> Option<&str> {
        match self {
            StrataError::Apply { migration, .. } => Some(migration),
            _ => None,
        }
    }
}

/// Result type alias using StrataError.
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StrataError::store("latest_batch", "relation does not exist");
        assert_eq!(
            err.to_string(),
            "Record store error during latest_batch: relation does not exist"
        );
    }

    #[test]
    fn test_apply_error_keeps_cause() {
        let err = StrataError::apply("CreateUsers", StrataError::Migration("boom".into()));
        assert_eq!(err.failed_migration(), Some("CreateUsers"));
        assert_eq!(
            err.to_string(),
            "Migration 'CreateUsers' failed: Migration error: boom"
        );

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Migration error: boom"));
    }

    #[test]
    fn test_connection_error_normalization() {
        let err = StrataError::Database("pool closed".into()).into_connection_error();
        assert!(matches!(err, StrataError::Connection(ref m) if m == "Database error: pool closed"));

        let err = StrataError::Connection("refused".into()).into_connection_error();
        assert_eq!(err.to_string(), "Connection error: refused");
    }
}
