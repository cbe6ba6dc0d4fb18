//! Durable queue behavior: ordering, backoff, dead-lettering, and
//! positional re-indexing.

use std::sync::Arc;

use chrono::Duration;

use issue_relay::clock::{Clock, ManualClock};
use issue_relay::models::queue::QueueKind;
use issue_relay::queue::QueueManager;

use super::test_helpers::{start_time, test_db};

async fn manager() -> (Arc<QueueManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let queue = Arc::new(QueueManager::new(test_db().await, Arc::clone(&clock) as Arc<dyn Clock>));
    (queue, clock)
}

#[tokio::test]
async fn enqueued_items_come_back_in_fifo_order() {
    let (queue, _clock) = manager().await;

    for n in 0..3 {
        queue
            .enqueue(QueueKind::Signup, &format!("sub-{n}"), "issue-1", None)
            .await
            .expect("enqueue");
    }

    let batch = queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch");
    let ids: Vec<_> = batch
        .iter()
        .map(|(pos, item)| (*pos, item.subscriber_id.as_str()))
        .collect();
    assert_eq!(ids, vec![(0, "sub-0"), (1, "sub-1"), (2, "sub-2")]);
}

#[tokio::test]
async fn ready_batch_respects_the_limit() {
    let (queue, _clock) = manager().await;

    for n in 0..5 {
        queue
            .enqueue(QueueKind::Signup, &format!("sub-{n}"), "issue-1", None)
            .await
            .expect("enqueue");
    }

    let batch = queue
        .get_ready_batch(QueueKind::Signup, 2)
        .await
        .expect("ready batch");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].1.subscriber_id, "sub-0");
}

#[tokio::test]
async fn queues_are_isolated_from_each_other() {
    let (queue, _clock) = manager().await;

    queue
        .enqueue(QueueKind::Signup, "sub-1", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .enqueue(QueueKind::Resolved, "sub-2", "issue-1", Some("9001"))
        .await
        .expect("enqueue");

    let signup = queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch");
    let resolved = queue
        .get_ready_batch(QueueKind::Resolved, 10)
        .await
        .expect("ready batch");

    assert_eq!(signup.len(), 1);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].1.conversation_id.as_deref(), Some("9001"));
}

#[tokio::test]
async fn mark_processed_reindexes_survivors_contiguously() {
    let (queue, _clock) = manager().await;

    for n in 0..3 {
        queue
            .enqueue(QueueKind::Signup, &format!("sub-{n}"), "issue-1", None)
            .await
            .expect("enqueue");
    }

    // Remove the middle item; the tail shifts down by one.
    queue
        .mark_processed(QueueKind::Signup, 1)
        .await
        .expect("mark processed");

    let batch = queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch");
    let ids: Vec<_> = batch
        .iter()
        .map(|(pos, item)| (*pos, item.subscriber_id.as_str()))
        .collect();
    assert_eq!(ids, vec![(0, "sub-0"), (1, "sub-2")]);
}

#[tokio::test]
async fn failed_item_waits_out_its_backoff_before_reappearing() {
    let (queue, clock) = manager().await;

    queue
        .enqueue(QueueKind::Signup, "sub-1", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .mark_failed(QueueKind::Signup, 0, "api: 500: boom")
        .await
        .expect("mark failed");

    // Not ready until the first backoff interval elapses.
    assert!(queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch")
        .is_empty());

    clock.advance(Duration::minutes(4));
    assert!(queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch")
        .is_empty());

    clock.advance(Duration::minutes(1));
    let batch = queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].1.retry_count, 1);
    assert_eq!(batch[0].1.last_error.as_deref(), Some("api: 500: boom"));
}

#[tokio::test]
async fn backoff_escalates_then_item_dead_letters() {
    let (queue, clock) = manager().await;

    queue
        .enqueue(QueueKind::Signup, "sub-1", "issue-1", None)
        .await
        .expect("enqueue");

    // Five failing attempts walk the whole backoff schedule.
    for minutes in [5i64, 15, 30, 60, 120] {
        queue
            .mark_failed(QueueKind::Signup, 0, "api: 500: boom")
            .await
            .expect("mark failed");
        assert!(queue
            .get_ready_batch(QueueKind::Signup, 10)
            .await
            .expect("ready batch")
            .is_empty());
        clock.advance(Duration::minutes(minutes));
        assert_eq!(
            queue
                .get_ready_batch(QueueKind::Signup, 10)
                .await
                .expect("ready batch")
                .len(),
            1
        );
    }

    // The sixth failure exhausts the retry allowance.
    queue
        .mark_failed(QueueKind::Signup, 0, "api: 500: boom")
        .await
        .expect("mark failed");

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.signup_pending, 0);
    assert_eq!(stats.failed, 1);

    let failed = queue.list_failed().await.expect("list failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1.original_kind, QueueKind::Signup);
    assert_eq!(failed[0].1.item.retry_count, 6);
}

#[tokio::test]
async fn mark_failed_on_a_missing_position_is_a_no_op() {
    let (queue, _clock) = manager().await;

    queue
        .mark_failed(QueueKind::Signup, 7, "ghost")
        .await
        .expect("no-op");

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.total_pending, 0);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn dead_letter_skips_the_retry_cycle() {
    let (queue, _clock) = manager().await;

    queue
        .enqueue(QueueKind::Resolved, "sub-1", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .dead_letter(QueueKind::Resolved, 0, "missing required item fields")
        .await
        .expect("dead letter");

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.resolved_pending, 0);
    assert_eq!(stats.failed, 1);

    let failed = queue.list_failed().await.expect("list failed");
    assert_eq!(
        failed[0].1.item.last_error.as_deref(),
        Some("missing required item fields")
    );
    assert_eq!(failed[0].1.item.retry_count, 0);
}

#[tokio::test]
async fn retry_failed_item_requeues_with_a_clean_slate() {
    let (queue, _clock) = manager().await;

    queue
        .enqueue(QueueKind::Resolved, "sub-1", "issue-1", Some("9001"))
        .await
        .expect("enqueue");
    queue
        .dead_letter(QueueKind::Resolved, 0, "operator parked this")
        .await
        .expect("dead letter");

    assert!(queue.retry_failed_item(0).await.expect("retry"));

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.resolved_pending, 1);
    assert_eq!(stats.failed, 0);

    let batch = queue
        .get_ready_batch(QueueKind::Resolved, 10)
        .await
        .expect("ready batch");
    assert_eq!(batch[0].1.retry_count, 0);
    assert!(batch[0].1.last_error.is_none());
    assert_eq!(batch[0].1.conversation_id.as_deref(), Some("9001"));
}

#[tokio::test]
async fn retry_failed_item_with_unknown_index_returns_false() {
    let (queue, _clock) = manager().await;

    assert!(!queue.retry_failed_item(0).await.expect("retry"));
}

#[tokio::test]
async fn retrying_reindexes_the_remaining_failed_items() {
    let (queue, _clock) = manager().await;

    for n in 0..3 {
        queue
            .enqueue(QueueKind::Signup, &format!("sub-{n}"), "issue-1", None)
            .await
            .expect("enqueue");
        queue
            .dead_letter(QueueKind::Signup, 0, "park")
            .await
            .expect("dead letter");
    }

    assert!(queue.retry_failed_item(1).await.expect("retry"));

    let failed = queue.list_failed().await.expect("list failed");
    let ids: Vec<_> = failed
        .iter()
        .map(|(pos, item)| (*pos, item.item.subscriber_id.as_str()))
        .collect();
    assert_eq!(ids, vec![(0, "sub-0"), (1, "sub-2")]);
}

#[tokio::test]
async fn remove_for_subscriber_drops_every_pending_entry() {
    let (queue, _clock) = manager().await;

    queue
        .enqueue(QueueKind::Signup, "sub-keep", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .enqueue(QueueKind::Signup, "sub-gone", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .enqueue(QueueKind::Signup, "sub-keep-2", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .enqueue(QueueKind::Resolved, "sub-gone", "issue-1", Some("9001"))
        .await
        .expect("enqueue");

    queue
        .remove_for_subscriber("sub-gone")
        .await
        .expect("remove");

    let signup = queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("ready batch");
    let ids: Vec<_> = signup
        .iter()
        .map(|(pos, item)| (*pos, item.subscriber_id.as_str()))
        .collect();
    assert_eq!(ids, vec![(0, "sub-keep"), (1, "sub-keep-2")]);

    assert!(queue
        .get_ready_batch(QueueKind::Resolved, 10)
        .await
        .expect("ready batch")
        .is_empty());
}

#[tokio::test]
async fn clear_all_empties_every_queue() {
    let (queue, _clock) = manager().await;

    queue
        .enqueue(QueueKind::Signup, "sub-1", "issue-1", None)
        .await
        .expect("enqueue");
    queue
        .enqueue(QueueKind::Resolved, "sub-2", "issue-1", Some("9001"))
        .await
        .expect("enqueue");
    queue
        .dead_letter(QueueKind::Resolved, 0, "park")
        .await
        .expect("dead letter");

    queue.clear_all().await.expect("clear");

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.signup_pending, 0);
    assert_eq!(stats.resolved_pending, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.total_pending, 0);
}

#[tokio::test]
async fn stats_count_each_queue_separately() {
    let (queue, _clock) = manager().await;

    for n in 0..2 {
        queue
            .enqueue(QueueKind::Signup, &format!("sub-{n}"), "issue-1", None)
            .await
            .expect("enqueue");
    }
    queue
        .enqueue(QueueKind::Resolved, "sub-9", "issue-1", Some("9001"))
        .await
        .expect("enqueue");

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.signup_pending, 2);
    assert_eq!(stats.resolved_pending, 1);
    assert_eq!(stats.total_pending, 3);
    assert_eq!(stats.failed, 0);
}
