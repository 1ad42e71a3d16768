//! Mapping of `sqlx` errors onto the domain's store errors.

use domain::StoreError;

/// SQLSTATE class for integrity constraint violations.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Translates a driver error into the store error the engines understand.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            classify_sqlstate(&code, db_err.message())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Io(io) => StoreError::Unavailable(io.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn classify_sqlstate(code: &str, message: &str) -> StoreError {
    if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
        StoreError::SerializationFailure(message.to_string())
    } else if code.starts_with(INTEGRITY_CONSTRAINT_CLASS) {
        StoreError::Constraint(message.to_string())
    } else {
        StoreError::Backend(format!("{} ({})", message, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_codes_are_retryable() {
        assert!(matches!(
            classify_sqlstate("40001", "could not serialize access"),
            StoreError::SerializationFailure(_)
        ));
        assert!(matches!(
            classify_sqlstate("40P01", "deadlock detected"),
            StoreError::SerializationFailure(_)
        ));
    }

    #[test]
    fn test_integrity_violations_map_to_constraint() {
        assert!(matches!(
            classify_sqlstate("23505", "duplicate key"),
            StoreError::Constraint(_)
        ));
        assert!(matches!(
            classify_sqlstate("23503", "foreign key"),
            StoreError::Constraint(_)
        ));
    }

    #[test]
    fn test_other_errors() {
        assert!(matches!(
            classify_sqlstate("42P01", "relation does not exist"),
            StoreError::Backend(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }
}
