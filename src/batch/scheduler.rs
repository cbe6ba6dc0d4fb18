//! Fixed-interval trigger for the batch processor.
//!
//! Runs as a background task; overlapping ticks are skipped by the
//! processor's single-flight guard rather than queued up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::processor::BatchProcessor;

/// Spawn the periodic queue processing task.
#[must_use]
pub fn spawn_scheduler(
    processor: Arc<BatchProcessor>,
    batch_size: usize,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick would race server startup traffic.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("batch scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match processor.try_process_queues(batch_size).await {
                        Ok(Some(outcome)) => {
                            info!(
                                signup_success = outcome.signup.success,
                                signup_failed = outcome.signup.failed,
                                resolved_success = outcome.resolved.success,
                                resolved_failed = outcome.resolved.failed,
                                "scheduled batch run complete"
                            );
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!(%err, "scheduled batch run failed");
                        }
                    }
                }
            }
        }
    })
}
