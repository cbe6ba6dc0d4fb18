//! Notification queue item models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named notification queue a pending item belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Signup confirmation notifications for newly affected users.
    Signup,
    /// Resolution notices posted into an existing conversation.
    Resolved,
}

impl QueueKind {
    /// Stable string form used in persistence and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending notification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Which notification this item produces.
    pub kind: QueueKind,
    /// Subscriber record identifier.
    pub subscriber_id: String,
    /// Issue entity identifier.
    pub issue_id: String,
    /// Existing Help Scout conversation id; required for `Resolved` items.
    pub conversation_id: Option<String>,
    /// Number of failed delivery attempts so far.
    pub retry_count: u32,
    /// Item is eligible for processing once `now >= next_attempt_at`.
    pub next_attempt_at: DateTime<Utc>,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Build a fresh item ready for immediate processing.
    #[must_use]
    pub fn new(
        kind: QueueKind,
        subscriber_id: impl Into<String>,
        issue_id: impl Into<String>,
        conversation_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            subscriber_id: subscriber_id.into(),
            issue_id: issue_id.into(),
            conversation_id,
            retry_count: 0,
            next_attempt_at: now,
            last_error: None,
        }
    }

    /// Whether the item carries everything its notification kind needs.
    ///
    /// `Resolved` items must reference an existing conversation; items
    /// missing required fields are dead-lettered without an API attempt.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        if self.subscriber_id.is_empty() || self.issue_id.is_empty() {
            return false;
        }
        match self.kind {
            QueueKind::Signup => true,
            QueueKind::Resolved => self
                .conversation_id
                .as_deref()
                .is_some_and(|id| !id.is_empty()),
        }
    }
}

/// A queue item that exhausted its retries, parked for operator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    /// The item as it looked at its final failure.
    pub item: QueueItem,
    /// Queue the item came from, used when it is manually replayed.
    pub original_kind: QueueKind,
    /// When the item was moved to the failed queue.
    pub failed_at: DateTime<Utc>,
}

/// Aggregate queue depths reported to the operator surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Items waiting in the signup queue.
    pub signup_pending: usize,
    /// Items waiting in the resolved queue.
    pub resolved_pending: usize,
    /// Items parked in the failed queue.
    pub failed: usize,
    /// Sum of signup and resolved pending counts.
    pub total_pending: usize,
}

/// Per-queue outcome counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Items pulled from the ready batch.
    pub processed: usize,
    /// Items delivered and removed.
    pub success: usize,
    /// Items that failed (retried or dead-lettered).
    pub failed: usize,
}
