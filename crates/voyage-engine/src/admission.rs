//! Admission / Submission: accepts client submissions, enforces id
//! uniqueness, decides local-run vs enqueue, and supports quiesce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use voyage_core::{Error, Factory, InputParameters, OperationStatus, Result};
use voyage_persistence::Journal;
use voyage_queue::{ReadyMessage, WorkQueue};

use crate::config::EngineConfig;
use crate::worker_pool::WorkerPool;

pub struct Admission {
    journal: Arc<dyn Journal>,
    factory: Arc<dyn Factory>,
    pool: Arc<WorkerPool>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    config: Arc<EngineConfig>,
    quiescing: AtomicBool,
}

impl Admission {
    pub fn new(
        journal: Arc<dyn Journal>,
        factory: Arc<dyn Factory>,
        pool: Arc<WorkerPool>,
        work_queue: Option<Arc<dyn WorkQueue>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self { journal, factory, pool, work_queue, config, quiescing: AtomicBool::new(false) }
    }

    pub fn is_quiescing(&self) -> bool {
        self.quiescing.load(Ordering::SeqCst)
    }

    /// Resolves the factory, creates the durable row, then either claims
    /// and schedules locally or falls back to the cluster work queue.
    pub async fn submit(
        &self,
        op_id: &str,
        class_name: &str,
        inputs: InputParameters,
    ) -> Result<()> {
        if self.is_quiescing() {
            return Err(Error::Shutdown);
        }
        self.validate_class(class_name, &inputs)?;
        self.journal.create(op_id, class_name, OperationStatus::Ready, &inputs, None).await?;

        let claimed = self.journal.claim(op_id, &self.config.instance_name).await?;
        if claimed {
            if self.pool.try_submit(op_id.to_string()) {
                return Ok(());
            }
            // Backlog full: release the claim and fall back to the queue.
            self.journal.disown(op_id, &self.config.instance_name).await?;
        }
        self.enqueue_ready(op_id).await
    }

    /// Always enqueues to the cluster work queue, regardless of local
    /// backlog state.
    pub async fn submit_to_queue(
        &self,
        op_id: &str,
        class_name: &str,
        inputs: InputParameters,
    ) -> Result<()> {
        if self.is_quiescing() {
            return Err(Error::Shutdown);
        }
        self.validate_class(class_name, &inputs)?;
        self.journal.create(op_id, class_name, OperationStatus::Ready, &inputs, None).await?;
        self.enqueue_ready(op_id).await
    }

    fn validate_class(&self, class_name: &str, inputs: &InputParameters) -> Result<()> {
        self.factory
            .create(class_name, inputs, &self.config.application_context)
            .map(|_| ())
            .map_err(|_| Error::UnknownClass(class_name.to_string()))
    }

    async fn enqueue_ready(&self, op_id: &str) -> Result<()> {
        match &self.work_queue {
            Some(queue) => queue.enqueue(&ReadyMessage::ready(op_id)).await,
            None => Err(Error::QueueError(
                "local backlog is full and no cluster work queue is configured".to_string(),
            )),
        }
    }

    /// Polls status until terminal or `timeout` elapses. Polling only; no
    /// cross-instance notification.
    pub async fn wait(&self, op_id: &str, timeout: Duration) -> Result<OperationStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let detail = self.journal.get_detail(op_id).await?;
            if detail.summary.status.is_terminal() {
                return Ok(detail.summary.status);
            }
            if Instant::now() >= deadline {
                return Err(Error::WaitTimedOut);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Stops accepting new submissions and pulling from the queue; waits
    /// up to `timeout` for operations owned by this instance to reach a
    /// safe boundary. Anything still RUNNING at the deadline is forcibly
    /// disowned back to READY for another instance to pick up.
    pub async fn quiesce(&self, timeout: Duration) -> Result<()> {
        self.quiescing.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        loop {
            let mine = self.journal.list_dead(std::slice::from_ref(&self.config.instance_name)).await?;
            if mine.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for op_id in mine {
                    let _ = self.journal.disown(&op_id, &self.config.instance_name).await;
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.pool.shutdown().await;
        Ok(())
    }
}
