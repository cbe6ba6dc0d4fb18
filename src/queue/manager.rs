//! Durable queue manager backed by `SQLite`.
//!
//! Owns all mutation of the three named queues (signup, resolved,
//! failed). Every read-modify-write runs inside a `SQLite` transaction;
//! a per-queue async mutex additionally serializes whole operations so
//! at most one batch run is in flight per queue. Each operation takes
//! exactly one mutex, so lock ordering never matters.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::models::queue::{FailedItem, QueueItem, QueueKind, QueueStats};
use crate::persistence::db::Database;
use crate::{AppError, Result};

/// Attempts after which an item is dead-lettered.
pub const MAX_RETRIES: u32 = 5;

/// Exponential backoff schedule in minutes, indexed by retry count.
pub const BACKOFF_MINUTES: [i64; 5] = [5, 15, 30, 60, 120];

/// Delay before the next attempt for a just-failed item.
///
/// `retry_count` is the count after the failure was recorded, so the
/// first failure (count 1) waits 5 minutes.
#[must_use]
pub fn backoff_delay(retry_count: u32) -> Duration {
    let index = usize::try_from(retry_count.saturating_sub(1))
        .map_or(BACKOFF_MINUTES.len() - 1, |i| {
            i.min(BACKOFF_MINUTES.len() - 1)
        });
    Duration::minutes(BACKOFF_MINUTES[index])
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    // Fixed-width UTC form so lexicographic order in SQL matches
    // chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid {field}: {err}")))
}

fn parse_kind(raw: &str) -> Result<QueueKind> {
    match raw {
        "signup" => Ok(QueueKind::Signup),
        "resolved" => Ok(QueueKind::Resolved),
        other => Err(AppError::Db(format!("invalid queue kind: {other}"))),
    }
}

/// Internal row struct for pending queue items.
#[derive(sqlx::FromRow)]
struct QueueRow {
    position: i64,
    subscriber_id: String,
    issue_id: String,
    conversation_id: Option<String>,
    retry_count: i64,
    next_attempt_at: String,
    last_error: Option<String>,
}

impl QueueRow {
    fn into_item(self, kind: QueueKind) -> Result<(i64, QueueItem)> {
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| AppError::Db(format!("negative retry_count: {}", self.retry_count)))?;
        Ok((
            self.position,
            QueueItem {
                kind,
                subscriber_id: self.subscriber_id,
                issue_id: self.issue_id,
                conversation_id: self.conversation_id,
                retry_count,
                next_attempt_at: parse_ts(&self.next_attempt_at, "next_attempt_at")?,
                last_error: self.last_error,
            },
        ))
    }
}

/// Internal row struct for dead-lettered items.
#[derive(sqlx::FromRow)]
struct FailedRow {
    position: i64,
    original_kind: String,
    subscriber_id: String,
    issue_id: String,
    conversation_id: Option<String>,
    retry_count: i64,
    last_error: Option<String>,
    failed_at: String,
}

impl FailedRow {
    fn into_item(self) -> Result<(i64, FailedItem)> {
        let original_kind = parse_kind(&self.original_kind)?;
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| AppError::Db(format!("negative retry_count: {}", self.retry_count)))?;
        let failed_at = parse_ts(&self.failed_at, "failed_at")?;
        Ok((
            self.position,
            FailedItem {
                item: QueueItem {
                    kind: original_kind,
                    subscriber_id: self.subscriber_id,
                    issue_id: self.issue_id,
                    conversation_id: self.conversation_id,
                    retry_count,
                    next_attempt_at: failed_at,
                    last_error: self.last_error,
                },
                original_kind,
                failed_at,
            },
        ))
    }
}

/// Durable, named notification queues.
pub struct QueueManager {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    signup_lock: Mutex<()>,
    resolved_lock: Mutex<()>,
    failed_lock: Mutex<()>,
}

impl QueueManager {
    /// Create a manager over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            signup_lock: Mutex::new(()),
            resolved_lock: Mutex::new(()),
            failed_lock: Mutex::new(()),
        }
    }

    fn lock_for(&self, kind: QueueKind) -> &Mutex<()> {
        match kind {
            QueueKind::Signup => &self.signup_lock,
            QueueKind::Resolved => &self.resolved_lock,
        }
    }

    /// Append a fresh item to the named queue, eligible immediately.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn enqueue(
        &self,
        kind: QueueKind,
        subscriber_id: &str,
        issue_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock_for(kind).lock().await;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO queue_item (queue, position, subscriber_id, issue_id,
             conversation_id, retry_count, next_attempt_at, last_error)
             SELECT ?1, COALESCE(MAX(position), -1) + 1, ?2, ?3, ?4, 0, ?5, NULL
             FROM queue_item WHERE queue = ?1",
        )
        .bind(kind.as_str())
        .bind(subscriber_id)
        .bind(issue_id)
        .bind(conversation_id)
        .bind(fmt_ts(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(queue = %kind, subscriber_id, issue_id, "enqueued notification item");
        Ok(())
    }

    /// Items whose `next_attempt_at` has passed, in queue order, capped
    /// at `limit`, paired with their positional index for later removal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_ready_batch(
        &self,
        kind: QueueKind,
        limit: usize,
    ) -> Result<Vec<(i64, QueueItem)>> {
        let now = fmt_ts(self.clock.now());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<QueueRow> = sqlx::query_as(
            "SELECT position, subscriber_id, issue_id, conversation_id,
             retry_count, next_attempt_at, last_error
             FROM queue_item WHERE queue = ?1 AND next_attempt_at <= ?2
             ORDER BY position LIMIT ?3",
        )
        .bind(kind.as_str())
        .bind(&now)
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(|row| row.into_item(kind)).collect()
    }

    /// Remove a successfully delivered item; remaining items are
    /// re-indexed contiguously.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the mutation fails.
    pub async fn mark_processed(&self, kind: QueueKind, position: i64) -> Result<()> {
        let _guard = self.lock_for(kind).lock().await;

        let mut tx = self.db.begin().await?;
        let removed = sqlx::query("DELETE FROM queue_item WHERE queue = ?1 AND position = ?2")
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed > 0 {
            sqlx::query(
                "UPDATE queue_item SET position = position - 1
                 WHERE queue = ?1 AND position > ?2",
            )
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
            debug!(queue = %kind, position, "removed processed item");
        }
        tx.commit().await?;

        Ok(())
    }

    /// Record a failed attempt: schedule a backoff retry, or move the
    /// item to the failed queue once it has exceeded [`MAX_RETRIES`].
    ///
    /// A missing position is a no-op; a crashed prior run may already
    /// have removed the item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the mutation fails.
    pub async fn mark_failed(&self, kind: QueueKind, position: i64, error: &str) -> Result<()> {
        let _guard = self.lock_for(kind).lock().await;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let row: Option<QueueRow> = sqlx::query_as(
            "SELECT position, subscriber_id, issue_id, conversation_id,
             retry_count, next_attempt_at, last_error
             FROM queue_item WHERE queue = ?1 AND position = ?2",
        )
        .bind(kind.as_str())
        .bind(position)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(());
        };
        let (_, mut item) = row.into_item(kind)?;
        item.retry_count += 1;
        item.last_error = Some(error.to_owned());

        if item.retry_count > MAX_RETRIES {
            Self::insert_failed(&mut tx, &item, kind, now).await?;
            Self::remove_and_reindex(&mut tx, kind, position).await?;
            warn!(
                queue = %kind,
                position,
                retries = MAX_RETRIES,
                "moved item to failed queue after exhausting retries"
            );
        } else {
            let delay = backoff_delay(item.retry_count);
            item.next_attempt_at = now + delay;
            sqlx::query(
                "UPDATE queue_item SET retry_count = ?1, last_error = ?2, next_attempt_at = ?3
                 WHERE queue = ?4 AND position = ?5",
            )
            .bind(i64::from(item.retry_count))
            .bind(&item.last_error)
            .bind(fmt_ts(item.next_attempt_at))
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
            info!(
                queue = %kind,
                position,
                retry = item.retry_count,
                minutes = delay.num_minutes(),
                "scheduled retry"
            );
        }
        tx.commit().await?;

        Ok(())
    }

    /// Move an invalid item straight to the failed queue, bypassing the
    /// retry cycle. Used for items that can never succeed, e.g. a
    /// resolved-queue item with no conversation reference.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the mutation fails.
    pub async fn dead_letter(&self, kind: QueueKind, position: i64, error: &str) -> Result<()> {
        let _guard = self.lock_for(kind).lock().await;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let row: Option<QueueRow> = sqlx::query_as(
            "SELECT position, subscriber_id, issue_id, conversation_id,
             retry_count, next_attempt_at, last_error
             FROM queue_item WHERE queue = ?1 AND position = ?2",
        )
        .bind(kind.as_str())
        .bind(position)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(());
        };
        let (_, mut item) = row.into_item(kind)?;
        item.last_error = Some(error.to_owned());

        Self::insert_failed(&mut tx, &item, kind, now).await?;
        Self::remove_and_reindex(&mut tx, kind, position).await?;
        tx.commit().await?;

        warn!(queue = %kind, position, error, "dead-lettered invalid item");
        Ok(())
    }

    /// Move a failed-queue entry back into its original queue with the
    /// retry count reset. Returns `false` if the index does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the mutation fails.
    pub async fn retry_failed_item(&self, position: i64) -> Result<bool> {
        let _guard = self.failed_lock.lock().await;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let row: Option<FailedRow> = sqlx::query_as(
            "SELECT position, original_kind, subscriber_id, issue_id,
             conversation_id, retry_count, last_error, failed_at
             FROM failed_item WHERE position = ?1",
        )
        .bind(position)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(false);
        };
        let (_, failed) = row.into_item()?;
        let kind = failed.original_kind;

        sqlx::query(
            "INSERT INTO queue_item (queue, position, subscriber_id, issue_id,
             conversation_id, retry_count, next_attempt_at, last_error)
             SELECT ?1, COALESCE(MAX(position), -1) + 1, ?2, ?3, ?4, 0, ?5, NULL
             FROM queue_item WHERE queue = ?1",
        )
        .bind(kind.as_str())
        .bind(&failed.item.subscriber_id)
        .bind(&failed.item.issue_id)
        .bind(&failed.item.conversation_id)
        .bind(fmt_ts(now))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM failed_item WHERE position = ?1")
            .bind(position)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE failed_item SET position = position - 1 WHERE position > ?1")
            .bind(position)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(position, queue = %kind, "moved failed item back for retry");
        Ok(true)
    }

    /// Remove every pending entry referencing a subscriber from both
    /// live queues. Called on unsubscribe so no notification fires
    /// after cancellation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the mutation fails.
    pub async fn remove_for_subscriber(&self, subscriber_id: &str) -> Result<()> {
        for kind in [QueueKind::Signup, QueueKind::Resolved] {
            let _guard = self.lock_for(kind).lock().await;

            let mut tx = self.db.begin().await?;
            let removed =
                sqlx::query("DELETE FROM queue_item WHERE queue = ?1 AND subscriber_id = ?2")
                    .bind(kind.as_str())
                    .bind(subscriber_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

            if removed > 0 {
                // Renumber survivors contiguously in one pass.
                sqlx::query(
                    "UPDATE queue_item SET position =
                     (SELECT COUNT(*) FROM queue_item q2
                      WHERE q2.queue = queue_item.queue
                        AND q2.position < queue_item.position)
                     WHERE queue = ?1",
                )
                .bind(kind.as_str())
                .execute(&mut *tx)
                .await?;
                debug!(queue = %kind, subscriber_id, removed, "removed unsubscribed items");
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Drop every queue, including the failed queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the deletes fail.
    pub async fn clear_all(&self) -> Result<()> {
        let _signup = self.signup_lock.lock().await;
        let _resolved = self.resolved_lock.lock().await;
        let _failed = self.failed_lock.lock().await;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM queue_item").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM failed_item").execute(&mut *tx).await?;
        tx.commit().await?;

        info!("cleared all notification queues");
        Ok(())
    }

    /// Aggregate queue depths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the counts fail.
    pub async fn get_stats(&self) -> Result<QueueStats> {
        let signup = self.count_queue(QueueKind::Signup).await?;
        let resolved = self.count_queue(QueueKind::Resolved).await?;
        let failed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM failed_item")
            .fetch_one(self.db.as_ref())
            .await?;

        Ok(QueueStats {
            signup_pending: usize::try_from(signup).unwrap_or(0),
            resolved_pending: usize::try_from(resolved).unwrap_or(0),
            failed: usize::try_from(failed).unwrap_or(0),
            total_pending: usize::try_from(signup + resolved).unwrap_or(0),
        })
    }

    /// List dead-lettered items with their positional indexes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_failed(&self) -> Result<Vec<(i64, FailedItem)>> {
        let rows: Vec<FailedRow> = sqlx::query_as(
            "SELECT position, original_kind, subscriber_id, issue_id,
             conversation_id, retry_count, last_error, failed_at
             FROM failed_item ORDER BY position",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(FailedRow::into_item).collect()
    }

    async fn count_queue(&self, kind: QueueKind) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_item WHERE queue = ?1")
            .bind(kind.as_str())
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn insert_failed(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        item: &QueueItem,
        original_kind: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO failed_item (position, original_kind, subscriber_id, issue_id,
             conversation_id, retry_count, last_error, failed_at)
             SELECT COALESCE(MAX(position), -1) + 1, ?1, ?2, ?3, ?4, ?5, ?6, ?7
             FROM failed_item",
        )
        .bind(original_kind.as_str())
        .bind(&item.subscriber_id)
        .bind(&item.issue_id)
        .bind(&item.conversation_id)
        .bind(i64::from(item.retry_count))
        .bind(&item.last_error)
        .bind(fmt_ts(now))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn remove_and_reindex(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        kind: QueueKind,
        position: i64,
    ) -> Result<()> {
        sqlx::query("DELETE FROM queue_item WHERE queue = ?1 AND position = ?2")
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            "UPDATE queue_item SET position = position - 1 WHERE queue = ?1 AND position > ?2",
        )
        .bind(kind.as_str())
        .bind(position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
