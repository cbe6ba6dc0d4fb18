//! Affected-user subscription repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::subscriber::{NotificationStatus, Subscriber};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for subscriber records.
#[derive(Clone)]
pub struct SubscriberRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: String,
    issue_id: String,
    email: String,
    status: String,
    approved: i64,
    conversation_id: Option<String>,
    created_at: String,
}

impl SubscriberRow {
    fn into_subscriber(self) -> Result<Subscriber> {
        let status = NotificationStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid subscriber status: {}", self.status)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| AppError::Db(format!("invalid created_at: {err}")))?
            .with_timezone(&Utc);
        Ok(Subscriber {
            id: self.id,
            issue_id: self.issue_id,
            email: self.email,
            status,
            approved: self.approved != 0,
            conversation_id: self.conversation_id,
            created_at,
        })
    }
}

impl SubscriberRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a user as affected by an issue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the email is already subscribed
    /// to this issue, or `AppError::Db` on other insert failures.
    pub async fn create(
        &self,
        issue_id: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscriber> {
        let subscriber = Subscriber {
            id: uuid::Uuid::new_v4().to_string(),
            issue_id: issue_id.to_owned(),
            email: email.to_owned(),
            status: NotificationStatus::Pending,
            approved: false,
            conversation_id: None,
            created_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO subscriber (id, issue_id, email, status, approved, conversation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)",
        )
        .bind(&subscriber.id)
        .bind(&subscriber.issue_id)
        .bind(&subscriber.email)
        .bind(subscriber.status.as_str())
        .bind(subscriber.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(subscriber),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Validation(format!("{email} is already subscribed to issue {issue_id}")),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve a subscriber by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Subscriber>> {
        let row: Option<SubscriberRow> = sqlx::query_as("SELECT * FROM subscriber WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(SubscriberRow::into_subscriber).transpose()
    }

    /// Remove a subscription record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record does not exist, or
    /// `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM subscriber WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("subscriber {id} not found")));
        }
        Ok(())
    }

    /// List all subscribers of an issue in signup order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<Subscriber>> {
        let rows: Vec<SubscriberRow> =
            sqlx::query_as("SELECT * FROM subscriber WHERE issue_id = ?1 ORDER BY created_at")
                .bind(issue_id)
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(SubscriberRow::into_subscriber).collect()
    }

    /// List subscribers of an issue who still need a resolution notice:
    /// not yet in the terminal state and holding a conversation id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_awaiting_resolution(&self, issue_id: &str) -> Result<Vec<Subscriber>> {
        let rows: Vec<SubscriberRow> = sqlx::query_as(
            "SELECT * FROM subscriber
             WHERE issue_id = ?1
               AND status != 'resolved_notification_sent'
               AND conversation_id IS NOT NULL
               AND conversation_id != ''
             ORDER BY created_at",
        )
        .bind(issue_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SubscriberRow::into_subscriber).collect()
    }

    /// Record the conversation created by a signup notification and mark
    /// the subscriber notified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_conversation(&self, id: &str, conversation_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE subscriber SET conversation_id = ?1, status = 'notified' WHERE id = ?2",
        )
        .bind(conversation_id)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Transition a subscriber to the approved terminal state after the
    /// resolution notice was delivered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_resolution_sent(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE subscriber SET approved = 1, status = 'resolved_notification_sent'
             WHERE id = ?1",
        )
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }
}
