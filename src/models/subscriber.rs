//! Affected-user subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery state of the notifications owed to one subscriber.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Signup confirmation not yet delivered.
    Pending,
    /// Signup confirmation delivered; conversation exists.
    Notified,
    /// Resolution notice delivered; terminal state.
    ResolvedNotificationSent,
}

impl NotificationStatus {
    /// Stable string form used in persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::ResolvedNotificationSent => "resolved_notification_sent",
        }
    }

    /// Parse the persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "notified" => Some(Self::Notified),
            "resolved_notification_sent" => Some(Self::ResolvedNotificationSent),
            _ => None,
        }
    }
}

/// A user's registration of interest in one issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscriber {
    /// Internal identifier.
    pub id: String,
    /// Issue this subscription belongs to.
    pub issue_id: String,
    /// Contact email used as the Help Scout customer identity.
    pub email: String,
    /// Per-notification delivery status.
    pub status: NotificationStatus,
    /// Whether the underlying record has reached its approved terminal state.
    pub approved: bool,
    /// Help Scout conversation created by the signup notification.
    pub conversation_id: Option<String>,
    /// Signup time.
    pub created_at: DateTime<Utc>,
}
