//! The engine: flight state machine, worker pool, admission, recovery,
//! and retention, wired together behind one `Engine` handle.

pub mod admission;
pub mod config;
pub mod engine;
pub mod queue_listener;
pub mod recovery;
pub mod retention;
pub mod state_machine;
pub mod worker_pool;

pub use admission::Admission;
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{Engine, EngineBuilder};
pub use queue_listener::QueueListener;
pub use recovery::Recovery;
pub use retention::Retention;
pub use state_machine::{run_operation, RunOutcome, TerminalStatus};
pub use worker_pool::WorkerPool;
