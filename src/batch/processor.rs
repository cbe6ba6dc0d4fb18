//! Top-level queue processing driver.
//!
//! Pulls ready batches from each queue, dispatches to the notification
//! handler, and folds every per-item outcome back into queue state.
//! Only persistence failures escape this driver; losing track of an
//! item is worse than aborting the run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::helpscout::notifier::NotificationHandler;
use crate::models::queue::{QueueItem, QueueKind, RunStats};
use crate::queue::QueueManager;
use crate::Result;

/// Combined outcome of one processing run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProcessOutcome {
    /// Signup queue results.
    pub signup: RunStats,
    /// Resolved queue results.
    pub resolved: RunStats,
}

/// Single-process batch driver over both notification queues.
pub struct BatchProcessor {
    queue: Arc<QueueManager>,
    notifier: Arc<NotificationHandler>,
    item_delay: Duration,
    run_lock: Mutex<()>,
}

impl BatchProcessor {
    /// Create a processor with the configured inter-item delay.
    #[must_use]
    pub fn new(
        queue: Arc<QueueManager>,
        notifier: Arc<NotificationHandler>,
        item_delay: Duration,
    ) -> Self {
        Self {
            queue,
            notifier,
            item_delay,
            run_lock: Mutex::new(()),
        }
    }

    /// Process both queues, skipping entirely if a run is already in
    /// flight (overlapping scheduler ticks).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if queue state cannot be read or written.
    pub async fn try_process_queues(&self, batch_size: usize) -> Result<Option<ProcessOutcome>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("batch run already in flight, skipping");
            return Ok(None);
        };
        self.run(batch_size).await.map(Some)
    }

    /// Process both queues, waiting for any in-flight run to finish.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if queue state cannot be read or written.
    pub async fn process_queues(&self, batch_size: usize) -> Result<ProcessOutcome> {
        let _guard = self.run_lock.lock().await;
        self.run(batch_size).await
    }

    async fn run(&self, batch_size: usize) -> Result<ProcessOutcome> {
        info!(batch_size, "starting queue processing");
        let outcome = ProcessOutcome {
            signup: self.process_queue(QueueKind::Signup, batch_size).await?,
            resolved: self.process_queue(QueueKind::Resolved, batch_size).await?,
        };
        info!(
            signup = outcome.signup.processed,
            resolved = outcome.resolved.processed,
            "queue processing complete"
        );
        Ok(outcome)
    }

    /// Process one queue's ready batch in strict queue order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if queue state cannot be read or written.
    pub async fn process_queue(&self, kind: QueueKind, batch_size: usize) -> Result<RunStats> {
        let batch = self.queue.get_ready_batch(kind, batch_size).await?;
        let mut stats = RunStats {
            processed: batch.len(),
            ..RunStats::default()
        };

        for (position, item) in batch {
            if !item.has_required_fields() {
                // Invalid items can never succeed; park them for the
                // operator without burning an API call.
                self.queue
                    .dead_letter(kind, position, "missing required item fields")
                    .await?;
                stats.failed += 1;
                continue;
            }

            // Queue mutations propagate their own errors via `?`; every
            // notifier failure, whatever its cause, becomes per-item
            // retry state.
            match self.dispatch(kind, &item).await {
                Ok(()) => {
                    self.queue.mark_processed(kind, position).await?;
                    stats.success += 1;
                }
                Err(err) => {
                    self.queue
                        .mark_failed(kind, position, &err.to_string())
                        .await?;
                    stats.failed += 1;
                }
            }

            // Pause between items to respect external rate limits.
            tokio::time::sleep(self.item_delay).await;
        }

        Ok(stats)
    }

    async fn dispatch(&self, kind: QueueKind, item: &QueueItem) -> Result<()> {
        match kind {
            QueueKind::Signup => {
                self.notifier
                    .send_signup_notification(&item.subscriber_id, &item.issue_id)
                    .await
            }
            QueueKind::Resolved => {
                self.notifier
                    .send_resolution_notification(
                        &item.subscriber_id,
                        &item.issue_id,
                        item.conversation_id.as_deref().unwrap_or_default(),
                    )
                    .await
            }
        }
    }
}
