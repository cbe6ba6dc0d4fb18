//! Tracked issue entity and webhook mapping output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked issue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Not yet visible; incoming work.
    Draft,
    /// Live and being tracked.
    Publish,
    /// Work finished.
    Done,
    /// Closed without further action.
    Closed,
    /// Retired from view.
    Archived,
}

impl IssueStatus {
    /// Stable string form used in persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Publish => "publish",
            Self::Done => "done",
            Self::Closed => "closed",
            Self::Archived => "archived",
        }
    }

    /// Parse the persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "publish" => Some(Self::Publish),
            "done" => Some(Self::Done),
            "closed" => Some(Self::Closed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Human-readable label used in notification bodies.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Publish => "Published",
            Self::Done => "Done",
            Self::Closed => "Closed",
            Self::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked issue synced from Jira.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// Internal identifier.
    pub id: String,
    /// Jira issue key, e.g. `PROJ-123`.
    pub external_id: String,
    /// Issue title (Jira summary).
    pub title: String,
    /// Issue body (Jira description).
    pub content: String,
    /// Current lifecycle status.
    pub status: IssueStatus,
    /// Webhook event that last touched this issue.
    pub event_type: String,
    /// Jira project key.
    pub project: String,
    /// Jira issue type name.
    pub issue_type: String,
    /// Jira priority name.
    pub priority: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Ephemeral output of the payload mapper, handed to the issue store.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedIssue {
    /// Jira issue key.
    pub external_id: String,
    /// Mapped title.
    pub title: String,
    /// Mapped body content.
    pub content: String,
    /// Translated lifecycle status.
    pub status: IssueStatus,
    /// Originating webhook event name.
    pub event_type: String,
    /// Jira project key.
    pub project: String,
    /// Jira issue type name.
    pub issue_type: String,
    /// Jira priority name.
    pub priority: String,
}
