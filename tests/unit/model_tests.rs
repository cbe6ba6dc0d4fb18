use chrono::Utc;

use issue_relay::models::issue::IssueStatus;
use issue_relay::models::queue::{QueueItem, QueueKind};
use issue_relay::models::subscriber::NotificationStatus;

#[test]
fn fresh_queue_item_is_immediately_eligible() {
    let now = Utc::now();
    let item = QueueItem::new(QueueKind::Signup, "sub-1", "issue-1", None, now);

    assert_eq!(item.retry_count, 0);
    assert_eq!(item.next_attempt_at, now);
    assert!(item.last_error.is_none());
}

#[test]
fn signup_item_requires_subscriber_and_issue() {
    let now = Utc::now();
    let item = QueueItem::new(QueueKind::Signup, "sub-1", "issue-1", None, now);
    assert!(item.has_required_fields());

    let missing_sub = QueueItem::new(QueueKind::Signup, "", "issue-1", None, now);
    assert!(!missing_sub.has_required_fields());

    let missing_issue = QueueItem::new(QueueKind::Signup, "sub-1", "", None, now);
    assert!(!missing_issue.has_required_fields());
}

#[test]
fn resolved_item_also_requires_a_conversation() {
    let now = Utc::now();

    let with_conversation = QueueItem::new(
        QueueKind::Resolved,
        "sub-1",
        "issue-1",
        Some("12345".to_owned()),
        now,
    );
    assert!(with_conversation.has_required_fields());

    let without = QueueItem::new(QueueKind::Resolved, "sub-1", "issue-1", None, now);
    assert!(!without.has_required_fields());

    let empty = QueueItem::new(
        QueueKind::Resolved,
        "sub-1",
        "issue-1",
        Some(String::new()),
        now,
    );
    assert!(!empty.has_required_fields());
}

#[test]
fn queue_kind_round_trips_through_its_string_form() {
    assert_eq!(QueueKind::Signup.as_str(), "signup");
    assert_eq!(QueueKind::Resolved.as_str(), "resolved");
    assert_eq!(QueueKind::Signup.to_string(), "signup");
}

#[test]
fn issue_status_round_trips_through_its_string_form() {
    for status in [
        IssueStatus::Draft,
        IssueStatus::Publish,
        IssueStatus::Done,
        IssueStatus::Closed,
        IssueStatus::Archived,
    ] {
        assert_eq!(IssueStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(IssueStatus::parse("published"), None);
}

#[test]
fn issue_status_labels_are_human_readable() {
    assert_eq!(IssueStatus::Publish.label(), "Published");
    assert_eq!(IssueStatus::Done.label(), "Done");
}

#[test]
fn notification_status_round_trips_through_its_string_form() {
    for status in [
        NotificationStatus::Pending,
        NotificationStatus::Notified,
        NotificationStatus::ResolvedNotificationSent,
    ] {
        assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(NotificationStatus::parse("sent"), None);
}
