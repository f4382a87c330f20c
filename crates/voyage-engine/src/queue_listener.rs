//! Work Queue Adapter's pull side: periodically polls the cluster queue for
//! `Ready{flightId}` messages and feeds claimed operation ids to the worker
//! pool. The push side (publishing a `Ready` message when admission spills
//! to the queue, or when recovery re-enqueues an orphan) lives in
//! `Admission`/`Recovery`; this module only drains.
//!
//! Mirrors the sleep-or-stop-signal shape of `Retention`'s background loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use voyage_persistence::Journal;
use voyage_queue::{DispatchHandler, ReadyMessage, WorkQueue};

use crate::config::EngineConfig;
use crate::worker_pool::WorkerPool;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct QueueListener {
    work_queue: Option<Arc<dyn WorkQueue>>,
    journal: Arc<dyn Journal>,
    pool: Arc<WorkerPool>,
    config: Arc<EngineConfig>,
    stop: Arc<Notify>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl QueueListener {
    pub fn new(
        work_queue: Option<Arc<dyn WorkQueue>>,
        journal: Arc<dyn Journal>,
        pool: Arc<WorkerPool>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self { work_queue, journal, pool, config, stop: Arc::new(Notify::new()), handle: std::sync::Mutex::new(None) }
    }

    /// Spawns the poll loop. No-op when no cluster work queue is configured.
    pub fn start(self: &Arc<Self>) {
        let Some(queue) = self.work_queue.clone() else {
            return;
        };
        let journal = self.journal.clone();
        let pool = self.pool.clone();
        let instance_name = self.config.instance_name.clone();
        let stop = self.stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = stop.notified() => break,
                }

                let handler = make_handler(journal.clone(), pool.clone(), instance_name.clone());
                // Pull at most one message per tick: the pool's own backlog
                // (`max_queued`) is the real admission control, this loop
                // just keeps probing it.
                if let Err(err) = queue.dispatch(1, handler).await {
                    tracing::error!(error = %err, "work queue dispatch failed");
                }
            }
        });
        *self.handle.lock().expect("queue listener handle mutex poisoned") = Some(handle);
    }

    pub async fn stop(&self) {
        self.stop.notify_one();
        let handle = self.handle.lock().expect("queue listener handle mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn make_handler(journal: Arc<dyn Journal>, pool: Arc<WorkerPool>, instance_name: String) -> DispatchHandler {
    Arc::new(move |msg: ReadyMessage| {
        let journal = journal.clone();
        let pool = pool.clone();
        let instance_name = instance_name.clone();
        Box::pin(async move {
            if !msg.is_supported() {
                // Nack: unknown enum or an incompatible major version.
                return false;
            }
            match journal.claim(&msg.flight_id, &instance_name).await {
                Ok(true) => {
                    // Claimed; hand to the pool. If the pool's own backlog
                    // happens to be full right now, release the claim so a
                    // later poll (by us or a peer) can retry it — but the
                    // message itself is still consumed, matching the spec's
                    // "on success, schedules onto the pool and returns true".
                    if !pool.try_submit(msg.flight_id.clone()) {
                        let _ = journal.disown(&msg.flight_id, &instance_name).await;
                    }
                    true
                }
                // Not READY, or claimed by someone else already: the
                // message is consumed either way, another worker handled it.
                Ok(false) => true,
                Err(err) => {
                    tracing::warn!(flight_id = %msg.flight_id, error = %err, "claim failed during dispatch");
                    false
                }
            }
        })
    })
}
