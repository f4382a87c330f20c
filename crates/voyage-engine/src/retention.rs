//! Retention Janitor: periodically deletes completed operations older
//! than the configured horizon. Disabled unless
//! `EngineConfig::completed_flight_retention` is set.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use voyage_persistence::Journal;

use crate::config::EngineConfig;

pub struct Retention {
    journal: Arc<dyn Journal>,
    config: Arc<EngineConfig>,
    stop: Arc<Notify>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Retention {
    pub fn new(journal: Arc<dyn Journal>, config: Arc<EngineConfig>) -> Self {
        Self { journal, config, stop: Arc::new(Notify::new()), handle: std::sync::Mutex::new(None) }
    }

    /// Spawns the background sweep loop. No-op when retention is disabled.
    pub fn start(self: &Arc<Self>) {
        let Some(retention) = self.config.completed_flight_retention else {
            return;
        };
        let journal = self.journal.clone();
        let interval = self.config.retention_check_interval;
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.notified() => break,
                }
                let horizon = Utc::now() - chrono::Duration::from_std(retention)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                match journal.retain(horizon).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "retention janitor purged completed operations");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "retention sweep failed"),
                }
            }
        });
        *self.handle.lock().expect("retention handle mutex poisoned") = Some(handle);
    }

    pub async fn stop(&self) {
        self.stop.notify_one();
        let handle = self.handle.lock().expect("retention handle mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Runs one sweep immediately, independent of the scheduled interval.
    pub async fn sweep_now(&self) -> voyage_core::Result<u64> {
        let Some(retention) = self.config.completed_flight_retention else {
            return Ok(0);
        };
        let horizon = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        self.journal.retain(horizon).await
    }
}
