//! The top-level `Engine`: wires a `Journal`, `Factory`, optional
//! `WorkQueue`, worker pool, admission, recovery, and retention janitor
//! into one handle.

use std::sync::Arc;
use std::time::Duration;

use voyage_core::{Factory, HookList, InputParameters, OperationStatus, Result};
use voyage_persistence::Journal;
use voyage_queue::WorkQueue;

use crate::admission::Admission;
use crate::config::{EngineConfig, EngineConfigBuilder};
use crate::queue_listener::QueueListener;
use crate::recovery::Recovery;
use crate::retention::Retention;
use crate::worker_pool::WorkerPool;

pub struct Engine {
    config: Arc<EngineConfig>,
    journal: Arc<dyn Journal>,
    pool: Arc<WorkerPool>,
    admission: Arc<Admission>,
    recovery: Arc<Recovery>,
    retention: Arc<Retention>,
    queue_listener: Arc<QueueListener>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// `force_clean`/migration-adjacent step of the Recovery Coordinator's
    /// `initialize`: optionally wipes the data source, then returns the
    /// instance names on record so the caller's own orchestration layer
    /// (pod listing, lease check, ...) can decide which are actually dead
    /// before calling `recover(dead_peers)`. Call before `start`.
    pub async fn bootstrap(&self, force_clean: bool) -> Result<Vec<String>> {
        self.recovery.initialize(force_clean).await
    }

    /// Resets operations orphaned by `dead_peers` back to READY, re-enqueues
    /// every unowned READY operation, records this instance's row, then
    /// starts the worker pool, work-queue listener, and retention janitor.
    /// `dead_peers` may include this instance's own previous incarnation
    /// after a restart; pass an empty slice on a from-scratch start.
    pub async fn start(&self, dead_peers: &[String]) -> Result<usize> {
        let resumed = self.recovery.recover_and_start(dead_peers).await?;
        self.pool.start().await;
        self.retention.start();
        self.queue_listener.start();
        Ok(resumed)
    }

    pub async fn submit(&self, op_id: &str, class_name: &str, inputs: InputParameters) -> Result<()> {
        self.admission.submit(op_id, class_name, inputs).await
    }

    pub async fn submit_to_queue(
        &self,
        op_id: &str,
        class_name: &str,
        inputs: InputParameters,
    ) -> Result<()> {
        self.admission.submit_to_queue(op_id, class_name, inputs).await
    }

    pub async fn wait(&self, op_id: &str, timeout: Duration) -> Result<OperationStatus> {
        self.admission.wait(op_id, timeout).await
    }

    pub async fn quiesce(&self, timeout: Duration) -> Result<()> {
        self.queue_listener.stop().await;
        self.admission.quiesce(timeout).await?;
        self.retention.stop().await;
        Ok(())
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfigBuilder>,
    journal: Option<Arc<dyn Journal>>,
    factory: Option<Arc<dyn Factory>>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    hooks: Vec<Arc<dyn voyage_core::Hook>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfigBuilder) -> Self {
        self.config = Some(config);
        self
    }

    pub fn journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn Factory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn work_queue(mut self, work_queue: Arc<dyn WorkQueue>) -> Self {
        self.work_queue = Some(work_queue);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn voyage_core::Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Engine {
        let config = Arc::new(self.config.unwrap_or_default().build());
        let journal = self.journal.expect("Engine requires a journal");
        let factory = self.factory.expect("Engine requires a factory");
        let work_queue = self.work_queue.or_else(|| config.work_queue.clone());

        let mut hook_list = HookList::default();
        for hook in self.hooks {
            hook_list.push(hook);
        }
        let hooks = Arc::new(hook_list);

        let pool = Arc::new(WorkerPool::new(
            journal.clone(),
            factory.clone(),
            work_queue.clone(),
            config.clone(),
            hooks.clone(),
        ));
        let admission = Arc::new(Admission::new(
            journal.clone(),
            factory.clone(),
            pool.clone(),
            work_queue.clone(),
            config.clone(),
        ));
        let recovery = Arc::new(Recovery::new(
            journal.clone(),
            factory,
            pool.clone(),
            work_queue.clone(),
            config.clone(),
            hooks,
        ));
        let retention = Arc::new(Retention::new(journal.clone(), config.clone()));
        let queue_listener =
            Arc::new(QueueListener::new(work_queue, journal.clone(), pool.clone(), config.clone()));

        Engine { config, journal, pool, admission, recovery, retention, queue_listener }
    }
}
