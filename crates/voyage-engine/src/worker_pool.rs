//! Worker Pool: a fixed-size cooperative pool of `max_parallel` workers
//! executing state machines, fed by a bounded local backlog of size
//! `max_queued`.
//!
//! Callers must have already `claim`ed an operation (it is RUNNING, owned
//! by this instance) before handing its id to `try_submit`; the pool's job
//! is purely to bound concurrency and interleave steps across operations,
//! not to decide ownership.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use voyage_core::{Factory, HookList};
use voyage_persistence::Journal;
use voyage_queue::{ReadyMessage, WorkQueue};

use crate::config::EngineConfig;
use crate::state_machine::{self, RunOutcome};

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    inner: Arc<PoolInner>,
    workers: Mutex<Option<JoinSet<()>>>,
}

struct PoolInner {
    journal: Arc<dyn Journal>,
    factory: Arc<dyn Factory>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    config: Arc<EngineConfig>,
    hooks: Arc<HookList>,
}

impl WorkerPool {
    pub fn new(
        journal: Arc<dyn Journal>,
        factory: Arc<dyn Factory>,
        work_queue: Option<Arc<dyn WorkQueue>>,
        config: Arc<EngineConfig>,
        hooks: Arc<HookList>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queued);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            inner: Arc::new(PoolInner { journal, factory, work_queue, config, hooks }),
            workers: Mutex::new(None),
        }
    }

    /// Attempts to place `op_id` on the local backlog without blocking.
    /// Returns `false` when the backlog is full, the pool is shut down, or
    /// the caller should spill to the cluster work queue instead.
    pub fn try_submit(&self, op_id: String) -> bool {
        match self.sender.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.try_send(op_id).is_ok(),
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Spawns `max_parallel` worker tasks pulling from the shared backlog.
    pub async fn start(&self) {
        let mut set = JoinSet::new();
        for _ in 0..self.inner.config.max_parallel {
            let receiver = self.receiver.clone();
            let inner = self.inner.clone();
            set.spawn(async move {
                loop {
                    let next = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match next {
                        Some(op_id) => process_one(&inner, op_id).await,
                        None => break,
                    }
                }
            });
        }
        *self.workers.lock().await = Some(set);
    }

    /// Stops accepting new local work; existing workers drain the backlog
    /// and exit once it is closed and empty.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        if let Some(mut set) = self.workers.lock().await.take() {
            while set.join_next().await.is_some() {}
        }
    }
}

async fn process_one(inner: &PoolInner, op_id: String) {
    if let Err(err) = run_once(inner, &op_id).await {
        tracing::error!(operation_id = %op_id, error = %err, "worker failed to run operation");
    }
}

async fn run_once(inner: &PoolInner, op_id: &str) -> voyage_core::Result<()> {
    let reconstructed = inner.journal.reconstruct(op_id).await?;
    let mut definition =
        inner.factory.create(&reconstructed.class_name, &reconstructed.inputs, &inner.config.application_context)?;

    let outcome = state_machine::run_operation(
        op_id,
        &mut definition,
        &reconstructed.inputs,
        reconstructed.state,
        inner.journal.as_ref(),
        &inner.config,
        &inner.hooks,
    )
    .await?;

    if let RunOutcome::Stopped = outcome {
        if let Some(queue) = &inner.work_queue {
            queue.enqueue(&ReadyMessage::ready(op_id)).await?;
        }
    }
    Ok(())
}
