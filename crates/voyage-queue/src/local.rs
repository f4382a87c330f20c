//! An in-process queue: the default when no cluster queue is configured,
//! and a convenient test double.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use voyage_core::Result;

use crate::message::ReadyMessage;
use crate::work_queue::{DispatchHandler, WorkQueue};

#[derive(Default)]
pub struct LocalWorkQueue {
    messages: Mutex<VecDeque<ReadyMessage>>,
}

impl LocalWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WorkQueue for LocalWorkQueue {
    async fn enqueue(&self, msg: &ReadyMessage) -> Result<()> {
        self.messages.lock().await.push_back(msg.clone());
        Ok(())
    }

    async fn dispatch(&self, max: usize, handler: DispatchHandler) -> Result<usize> {
        let mut delivered = 0;
        for _ in 0..max {
            let msg = {
                let mut guard = self.messages.lock().await;
                match guard.pop_front() {
                    Some(m) => m,
                    None => break,
                }
            };
            if !msg.is_supported() {
                tracing::warn!(message_enum = %msg.message_enum, version = msg.version, "nacking unsupported message");
                continue;
            }
            let acked = handler(msg.clone()).await;
            delivered += 1;
            if !acked {
                self.messages.lock().await.push_back(msg);
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn dispatch_acks_remove_and_nacks_requeue() {
        let queue = LocalWorkQueue::new();
        queue.enqueue(&ReadyMessage::ready("op-1")).await.unwrap();
        queue.enqueue(&ReadyMessage::ready("op-2")).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: DispatchHandler = Arc::new(move |msg| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                msg.flight_id == "op-1"
            })
        });

        let delivered = queue.dispatch(10, handler).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.len().await, 1, "op-2 was nacked and requeued");
    }
}
