//! The `WorkQueue` adapter trait: the abstraction over whatever cluster
//! message queue the deployment actually runs (Kafka, SQS, a Postgres
//! table, ...). The engine only ever sees this trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use voyage_core::Result;

use crate::message::ReadyMessage;

/// Called once per dispatched message. Returning `true` acks it (removes
/// it from the queue); `false` nacks it (it becomes visible again later).
pub type DispatchHandler = Arc<dyn Fn(ReadyMessage) -> BoxFuture<'static, bool> + Send + Sync>;

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Durable append; at-least-once delivery.
    async fn enqueue(&self, msg: &ReadyMessage) -> Result<()>;

    /// Poll up to `max` messages; invoke `handler` for each. Returns how
    /// many messages were delivered (acked or nacked).
    async fn dispatch(&self, max: usize, handler: DispatchHandler) -> Result<usize>;

    /// Drains every message currently enqueued, acking all of them. Used by
    /// `force_clean` bootstraps; the default implementation just dispatches
    /// with an always-ack handler until nothing is left, so concrete
    /// adapters don't need their own implementation.
    async fn purge(&self) -> Result<()> {
        let always_ack: DispatchHandler = Arc::new(|_| Box::pin(async { true }));
        loop {
            let drained = self.dispatch(1000, always_ack.clone()).await?;
            if drained == 0 {
                break;
            }
        }
        Ok(())
    }
}
