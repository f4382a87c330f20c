//! Maps `sqlx::Error` into the engine's error taxonomy.

use voyage_core::Error as EngineError;

/// Postgres SQLSTATE for serialization failures under SERIALIZABLE isolation.
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for deadlock detected.
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";

pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            matches!(
                db_err.code().as_deref(),
                Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK_DETECTED)
            )
        }
        _ => false,
    }
}

pub fn map_sqlx_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::RowNotFound => EngineError::NotFound,
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                EngineError::DuplicateId
            } else {
                EngineError::Internal(err.to_string())
            }
        }
        _ => EngineError::Internal(err.to_string()),
    }
}
