use chrono::Duration;

use issue_relay::queue::{backoff_delay, BACKOFF_MINUTES, MAX_RETRIES};

#[test]
fn schedule_escalates_per_retry() {
    assert_eq!(backoff_delay(1), Duration::minutes(5));
    assert_eq!(backoff_delay(2), Duration::minutes(15));
    assert_eq!(backoff_delay(3), Duration::minutes(30));
    assert_eq!(backoff_delay(4), Duration::minutes(60));
    assert_eq!(backoff_delay(5), Duration::minutes(120));
}

#[test]
fn delay_saturates_at_the_longest_interval() {
    assert_eq!(backoff_delay(6), Duration::minutes(120));
    assert_eq!(backoff_delay(100), Duration::minutes(120));
    assert_eq!(backoff_delay(u32::MAX), Duration::minutes(120));
}

#[test]
fn zero_retries_uses_the_shortest_interval() {
    // Defensive input: mark_failed always increments before scheduling,
    // so 0 never occurs in practice.
    assert_eq!(backoff_delay(0), Duration::minutes(5));
}

#[test]
fn schedule_covers_every_allowed_retry() {
    assert_eq!(BACKOFF_MINUTES.len(), MAX_RETRIES as usize);
}
