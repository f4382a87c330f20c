//! The `Journal` DAO trait: the durable record of operations, their
//! per-step log, inputs, working map, ownership, and progress meters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use voyage_core::{Direction, ExecutionState, InputParameters, OperationStatus, Result};

/// One committed step-boundary log row.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: uuid::Uuid,
    pub op_id: String,
    pub log_time: DateTime<Utc>,
    pub step_index: usize,
    pub direction: Direction,
    pub rerun: bool,
    pub serialized_exception: Option<String>,
}

/// Everything `step_log` needs to commit one boundary atomically: the log
/// row, the working-map snapshot at that boundary, and (if it changed) the
/// operation's new status.
#[derive(Debug, Clone)]
pub struct StepLogWrite {
    pub op_id: String,
    pub step_index: usize,
    pub direction: Direction,
    pub rerun: bool,
    pub serialized_exception: Option<String>,
    pub working_map: std::collections::BTreeMap<String, String>,
    pub new_status: Option<OperationStatus>,
    /// When true, clears ownership in the same transaction that writes
    /// `new_status` (WAIT/STOP boundaries release the worker immediately;
    /// a separate `disown` call afterwards would race the status this
    /// write just committed, since `disown`'s precondition requires
    /// `status = RUNNING`).
    pub release_owner: bool,
}

/// Row-level summary returned by `enumerate` and admin listing calls.
#[derive(Debug, Clone)]
pub struct OperationSummary {
    pub id: String,
    pub class_name: String,
    pub submit_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
    pub status: OperationStatus,
    pub owner: Option<String>,
    pub serialized_exception: Option<String>,
}

/// Full detail for the administrative interface: the operation row plus
/// its immutable inputs and complete log.
#[derive(Debug, Clone)]
pub struct OperationDetail {
    pub summary: OperationSummary,
    pub inputs: InputParameters,
    pub log: Vec<LogEntry>,
}

/// What `reconstruct` hands back: enough to resume the state machine
/// exactly where it left off.
#[derive(Debug, Clone)]
pub struct ReconstructedOperation {
    pub class_name: String,
    pub inputs: InputParameters,
    pub status: OperationStatus,
    pub state: ExecutionState,
}

#[derive(Debug, Clone, Default)]
pub struct EnumerateFilter {
    pub status: Option<OperationStatus>,
    pub class_name: Option<String>,
    pub submitted_after: Option<DateTime<Utc>>,
    pub submitted_before: Option<DateTime<Utc>>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub input_equals: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressMeter {
    pub name: String,
    pub v1: i64,
    pub v2: i64,
}

/// The durable record of operations. Every method is its own transaction
/// unless documented otherwise; implementations must honor the ownership
/// compare-and-set semantics of `claim`/`disown` exactly (no read-then-write
/// race window).
#[async_trait]
pub trait Journal: Send + Sync {
    async fn create(
        &self,
        op_id: &str,
        class_name: &str,
        status: OperationStatus,
        inputs: &InputParameters,
        owner: Option<&str>,
    ) -> Result<()>;

    async fn step_log(&self, write: StepLogWrite) -> Result<()>;

    async fn exit(
        &self,
        op_id: &str,
        status: OperationStatus,
        serialized_exception: Option<String>,
    ) -> Result<()>;

    /// `(status=RUNNING, owner=me) -> (status=READY, owner=NULL)`. Returns
    /// whether the precondition held.
    async fn disown(&self, op_id: &str, owner: &str) -> Result<bool>;

    /// `(status=READY, owner=NULL) -> (status=RUNNING, owner=new_owner)`.
    /// Returns whether the precondition held.
    async fn claim(&self, op_id: &str, new_owner: &str) -> Result<bool>;

    async fn reconstruct(&self, op_id: &str) -> Result<ReconstructedOperation>;

    /// Operations currently owned by one of `peer_ids`.
    async fn list_dead(&self, peer_ids: &[String]) -> Result<Vec<String>>;

    async fn enumerate(
        &self,
        filter: &EnumerateFilter,
        limit: usize,
        page_token: Option<&str>,
    ) -> Result<Page<OperationSummary>>;

    async fn count(&self, filter: &EnumerateFilter) -> Result<i64>;

    /// Deletes every completed operation (and cascading satellites) whose
    /// `completed_time` is older than `horizon`. Returns the delete count.
    async fn retain(&self, horizon: DateTime<Utc>) -> Result<u64>;

    async fn register_instance(&self, instance_name: &str) -> Result<()>;
    async fn remove_instance(&self, instance_name: &str) -> Result<()>;
    async fn list_instances(&self) -> Result<Vec<String>>;

    async fn record_progress(&self, op_id: &str, name: &str, v1: i64, v2: i64) -> Result<()>;
    async fn get_progress(&self, op_id: &str) -> Result<Vec<ProgressMeter>>;

    async fn get_detail(&self, op_id: &str) -> Result<OperationDetail>;

    /// Admin: force an operation to READY regardless of current state,
    /// disowning it unconditionally.
    async fn force_ready(&self, op_id: &str) -> Result<()>;

    /// Admin: force an operation to terminal FATAL, disowned.
    async fn force_fatal(&self, op_id: &str, serialized_exception: Option<String>) -> Result<()>;

    /// `force_clean` support: wipes every operation, its satellites, and
    /// every registered instance. Used only at startup, before any
    /// operation is admitted.
    async fn truncate_all(&self) -> Result<()>;
}
