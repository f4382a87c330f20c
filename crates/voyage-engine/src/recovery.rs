//! Recovery Coordinator: brings a journal to a consistent state at
//! startup and resumes ownerless or orphaned operations.

use std::sync::Arc;

use voyage_core::{Factory, HookList, OperationStatus, Result};
use voyage_persistence::{EnumerateFilter, Journal};
use voyage_queue::WorkQueue;

use crate::config::EngineConfig;
use crate::worker_pool::WorkerPool;

/// Operations are paginated out of `enumerate` in batches this large while
/// sweeping for unowned READY rows.
const SWEEP_PAGE_SIZE: usize = 200;

pub struct Recovery {
    journal: Arc<dyn Journal>,
    factory: Arc<dyn Factory>,
    pool: Arc<WorkerPool>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    config: Arc<EngineConfig>,
    hooks: Arc<HookList>,
}

impl Recovery {
    pub fn new(
        journal: Arc<dyn Journal>,
        factory: Arc<dyn Factory>,
        pool: Arc<WorkerPool>,
        work_queue: Option<Arc<dyn WorkQueue>>,
        config: Arc<EngineConfig>,
        hooks: Arc<HookList>,
    ) -> Self {
        Self { journal, factory, pool, work_queue, config, hooks }
    }

    /// Prepares the data source before any operation is admitted:
    /// `force_clean` truncates every engine table and purges the work
    /// queue (for a from-scratch test/dev bootstrap); either way, returns
    /// the instance names currently on record, which the caller treats as
    /// candidate peers to hand to `recover_and_start` after its own
    /// orchestration layer (pod listing, lease check, ...) decides which
    /// of them are actually dead. This instance has not registered itself
    /// yet, so the returned list never contains it.
    pub async fn initialize(&self, force_clean: bool) -> Result<Vec<String>> {
        if force_clean {
            self.journal.truncate_all().await?;
            if let Some(queue) = &self.work_queue {
                queue.purge().await?;
            }
        }
        self.journal.list_instances().await
    }

    /// Resets every operation owned by a peer in `dead_peers` back to READY
    /// (disowned), re-enqueues every unowned READY operation (whether just
    /// orphaned or left over from a previous sweep), records this
    /// instance's row, and returns how many operations were handed back to
    /// a worker. A peer recovering its own prior incarnation passes its own
    /// previous instance name here too.
    pub async fn recover_and_start(&self, dead_peers: &[String]) -> Result<usize> {
        let orphaned = self.journal.list_dead(dead_peers).await?;
        for op_id in &orphaned {
            // The current owner is one of several dead peer names; reset
            // unconditionally rather than guessing which one via a
            // compare-and-set `disown`.
            self.journal.force_ready(op_id).await?;
        }

        let mut resumed = 0usize;
        for op_id in self.unowned_ready_ids().await? {
            if self.resume_one(&op_id).await? {
                resumed += 1;
            }
        }

        self.journal.register_instance(&self.config.instance_name).await?;
        for peer in dead_peers {
            self.journal.remove_instance(peer).await.ok();
        }
        Ok(resumed)
    }

    /// All operations currently READY with no owner, the full set eligible
    /// for pickup per the data-model invariant (`owner = NULL` iff READY).
    async fn unowned_ready_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        let filter = EnumerateFilter { status: Some(OperationStatus::Ready), ..Default::default() };
        loop {
            let page = self.journal.enumerate(&filter, SWEEP_PAGE_SIZE, page_token.as_deref()).await?;
            ids.extend(page.items.into_iter().map(|s| s.id));
            match page.next_page_token {
                Some(tok) => page_token = Some(tok),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn resume_one(&self, op_id: &str) -> Result<bool> {
        let claimed = self.journal.claim(op_id, &self.config.instance_name).await?;
        if !claimed {
            return Ok(false);
        }
        if self.pool.try_submit(op_id.to_string()) {
            return Ok(true);
        }
        self.journal.disown(op_id, &self.config.instance_name).await?;
        match &self.work_queue {
            Some(queue) => {
                queue.enqueue(&voyage_queue::ReadyMessage::ready(op_id)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn factory(&self) -> &Arc<dyn Factory> {
        &self.factory
    }

    pub fn hooks(&self) -> &Arc<HookList> {
        &self.hooks
    }
}
