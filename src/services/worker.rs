use crate::services::staging::StagingStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically evicts staged uploads that were never processed
pub struct StagingSweeper {
    store: Arc<StagingStore>,
    max_age: chrono::Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(
        store: Arc<StagingStore>,
        max_age: chrono::Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            max_age,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Staging sweeper started (max age {} min, every {:?})",
            self.max_age.num_minutes(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    async fn sweep(&self) {
        tracing::debug!("Sweeping abandoned uploads...");
        self.store
            .evict_older_than(self.max_age)
            .await
            .log("Staging sweep");
    }
}
