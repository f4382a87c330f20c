//! Postgres-backed Journal (durable DAO) for the operation engine.

pub mod config;
pub mod error;
pub mod journal;
pub mod pg;

pub use config::{build_pool, run_migrations, DbConfig, CONFIG};
pub use journal::{
    EnumerateFilter, Journal, LogEntry, OperationDetail, OperationSummary, Page, ProgressMeter,
    ReconstructedOperation, StepLogWrite,
};
pub use pg::PgJournal;
