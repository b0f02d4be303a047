//! Test assertion macros and helpers.

use crate::error::StrataError;

/// Assert that a result is Ok.
///
/// # Example
///
/// ```ignore
/// let report = config.migrate(&databases).await;
/// assert_ok!(report);
/// assert_ok!(report, "first run should apply everything");
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that an error matches a specific variant.
///
/// # Example
///
/// ```ignore
/// let result = migrations.migrate(&Databases::default()).await;
/// assert_err_variant!(result, StrataError::DatabaseNotFound(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Check if an error message contains a substring.
pub fn error_contains(error: &StrataError, substring: &str) -> bool {
    error.to_string().contains(substring)
}

/// Check whether an error is the apply failure of `migration`.
pub fn is_apply_failure_of(error: &StrataError, migration: &str) -> bool {
    error.failed_migration() == Some(migration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_ok_macro() {
        let result: Result<i32, String> = Ok(42);
        assert_ok!(result);
    }

    #[test]
    #[should_panic(expected = "expected Ok")]
    fn test_assert_ok_macro_fails() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_ok!(result);
    }

    #[test]
    fn test_assert_err_variant_macro() {
        let result: Result<(), StrataError> = Err(StrataError::DatabaseNotFound("x".into()));
        assert_err_variant!(result, StrataError::DatabaseNotFound(_));
    }

    #[test]
    #[should_panic(expected = "expected StrataError::Connection")]
    fn test_assert_err_variant_macro_fails() {
        let result: Result<(), StrataError> = Err(StrataError::DatabaseNotFound("x".into()));
        assert_err_variant!(result, StrataError::Connection(_));
    }

    #[test]
    fn test_error_contains() {
        let error = StrataError::store("write_record", "duplicate key");
        assert!(error_contains(&error, "write_record"));
        assert!(!error_contains(&error, "latest_batch"));
    }

    #[test]
    fn test_is_apply_failure_of() {
        let error = StrataError::apply("AddIndex", StrataError::Migration("bad".into()));
        assert!(is_apply_failure_of(&error, "AddIndex"));
        assert!(!is_apply_failure_of(&error, "CreateUsers"));
        assert!(!is_apply_failure_of(
            &StrataError::Migration("x".into()),
            "AddIndex"
        ));
    }
}
