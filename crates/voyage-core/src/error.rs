//! Error taxonomy shared by every layer of the engine.

use thiserror::Error;

/// Errors surfaced across the public API (spec of error kinds).
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation id already exists")]
    DuplicateId,

    #[error("factory cannot resolve class `{0}`")]
    UnknownClass(String),

    #[error("operation not found")]
    NotFound,

    #[error("invalid enumerate filter: {0}")]
    InvalidFilter(String),

    #[error("invalid page token")]
    InvalidPageToken,

    #[error("progress meter name uses a reserved prefix")]
    InvalidMeterName,

    #[error("engine is shutting down")]
    Shutdown,

    #[error("wait timed out")]
    WaitTimedOut,

    #[error("working map could not be reconstructed; operation forced to FATAL")]
    UnrecoverableMap,

    #[error("work queue adapter error: {0}")]
    QueueError(String),

    #[error("migration failed: {0}")]
    MigrateError(String),

    #[error("database setup failed: {0}")]
    DatabaseSetupError(String),

    #[error("step signaled retry: {0}")]
    RetryException(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
