//! Issue entity repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::issue::{Issue, IssueStatus, MappedIssue};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for tracked issue records.
#[derive(Clone)]
pub struct IssueRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct IssueRow {
    id: String,
    external_id: String,
    title: String,
    content: String,
    status: String,
    event_type: String,
    project: String,
    issue_type: String,
    priority: String,
    created_at: String,
    updated_at: String,
}

impl IssueRow {
    fn into_issue(self) -> Result<Issue> {
        let status = IssueStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid issue status: {}", self.status)))?;
        Ok(Issue {
            id: self.id,
            external_id: self.external_id,
            title: self.title,
            content: self.content,
            status,
            event_type: self.event_type,
            project: self.project,
            issue_type: self.issue_type,
            priority: self.priority,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
        })
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid {field}: {err}")))
}

/// One archived webhook delivery for an issue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryEntry {
    /// Webhook event name.
    pub event: String,
    /// Full JSON payload as received.
    pub payload: String,
    /// When the payload arrived.
    pub received_at: String,
}

impl IssueRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Look up an issue by its Jira key.
    ///
    /// Returns `Ok(None)` if no issue carries that key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Issue>> {
        let row: Option<IssueRow> = sqlx::query_as("SELECT * FROM issue WHERE external_id = ?1")
            .bind(external_id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(IssueRow::into_issue).transpose()
    }

    /// Retrieve an issue by internal identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Issue>> {
        let row: Option<IssueRow> = sqlx::query_as("SELECT * FROM issue WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(IssueRow::into_issue).transpose()
    }

    /// Insert a new issue from mapped webhook data.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, mapped: &MappedIssue, now: DateTime<Utc>) -> Result<Issue> {
        let issue = Issue {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: mapped.external_id.clone(),
            title: mapped.title.clone(),
            content: mapped.content.clone(),
            status: mapped.status,
            event_type: mapped.event_type.clone(),
            project: mapped.project.clone(),
            issue_type: mapped.issue_type.clone(),
            priority: mapped.priority.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO issue (id, external_id, title, content, status, event_type,
             project, issue_type, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&issue.id)
        .bind(&issue.external_id)
        .bind(&issue.title)
        .bind(&issue.content)
        .bind(issue.status.as_str())
        .bind(&issue.event_type)
        .bind(&issue.project)
        .bind(&issue.issue_type)
        .bind(&issue.priority)
        .bind(issue.created_at.to_rfc3339())
        .bind(issue.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(issue)
    }

    /// Overwrite an existing issue's fields from mapped webhook data.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update(&self, id: &str, mapped: &MappedIssue, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE issue SET title = ?1, content = ?2, status = ?3, event_type = ?4,
             project = ?5, issue_type = ?6, priority = ?7, updated_at = ?8
             WHERE id = ?9",
        )
        .bind(&mapped.title)
        .bind(&mapped.content)
        .bind(mapped.status.as_str())
        .bind(&mapped.event_type)
        .bind(&mapped.project)
        .bind(&mapped.issue_type)
        .bind(&mapped.priority)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Append a raw webhook payload to the issue's history log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append_history(
        &self,
        issue_id: &str,
        event: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO issue_history (issue_id, event, payload, received_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(issue_id)
        .bind(event)
        .bind(payload)
        .bind(now.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// List history entries for an issue in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryEntry> = sqlx::query_as(
            "SELECT event, payload, received_at FROM issue_history
             WHERE issue_id = ?1 ORDER BY seq",
        )
        .bind(issue_id)
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(rows)
    }
}
