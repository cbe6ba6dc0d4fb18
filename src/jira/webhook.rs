//! Inbound webhook orchestration: verify, map, sync, enqueue.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::models::queue::QueueKind;
use crate::persistence::issue_repo::IssueRepo;
use crate::persistence::subscriber_repo::SubscriberRepo;
use crate::queue::QueueManager;
use crate::{AppError, Result};

use super::payload;
use super::signature;
use super::status::{self, StatusMapper};

/// Whether the webhook created a new issue or updated an existing one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    /// A new issue entity was created.
    Created,
    /// An existing issue entity was updated.
    Updated,
}

/// Successful webhook processing result.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    /// Always true on success; mirrors the response body contract.
    pub success: bool,
    /// Internal id of the affected issue.
    pub issue_id: String,
    /// Whether the issue was created or updated.
    pub action: WebhookAction,
}

/// State-free per-request webhook processor.
///
/// Construction wires the stores, queue manager, and status mapper
/// explicitly; nothing here reaches for ambient state.
pub struct WebhookHandler {
    webhook_config: WebhookConfig,
    statuses: StatusMapper,
    issues: IssueRepo,
    subscribers: SubscriberRepo,
    queue: Arc<QueueManager>,
    clock: Arc<dyn Clock>,
}

impl WebhookHandler {
    /// Create a handler over the shared stores and queue manager.
    #[must_use]
    pub fn new(
        webhook_config: WebhookConfig,
        statuses: StatusMapper,
        issues: IssueRepo,
        subscribers: SubscriberRepo,
        queue: Arc<QueueManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            webhook_config,
            statuses,
            issues,
            subscribers,
            queue,
            clock,
        }
    }

    /// Process one inbound webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` when either the URL secret or the HMAC
    /// signature check fails (both are mandatory and independent),
    /// `AppError::Validation` for an empty or unmappable payload, and
    /// `AppError::Db` when an entity-store write fails.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
        url_secret: Option<&str>,
    ) -> Result<WebhookOutcome> {
        if !signature::verify_url_secret(
            url_secret.unwrap_or_default(),
            &self.webhook_config.url_secret,
        ) {
            warn!("webhook url secret verification failed");
            return Err(AppError::Auth("invalid webhook secret".into()));
        }
        if !signature::verify(
            raw_body,
            signature_header.unwrap_or_default(),
            &self.webhook_config.hmac_secret,
        ) {
            warn!("webhook hmac signature verification failed");
            return Err(AppError::Auth("invalid webhook signature".into()));
        }

        let parsed: Value = serde_json::from_slice(raw_body)
            .map_err(|err| AppError::Validation(format!("invalid webhook payload: {err}")))?;
        if parsed.as_object().is_none_or(serde_json::Map::is_empty) {
            return Err(AppError::Validation("empty webhook payload".into()));
        }

        let event = parsed["webhookEvent"].as_str().unwrap_or("unknown");
        info!(event, "webhook received");

        let mapped = payload::map(&parsed, &self.statuses);
        if mapped.external_id.is_empty() {
            return Err(AppError::Validation(
                "webhook payload missing issue key".into(),
            ));
        }

        let now = self.clock.now();
        let raw_payload = parsed.to_string();

        match self.issues.find_by_external_id(&mapped.external_id).await? {
            None => {
                let issue = self.issues.create(&mapped, now).await?;
                self.issues
                    .append_history(&issue.id, event, &raw_payload, now)
                    .await?;
                info!(issue_id = %issue.id, external_id = %mapped.external_id, "issue created");
                Ok(WebhookOutcome {
                    success: true,
                    issue_id: issue.id,
                    action: WebhookAction::Created,
                })
            }
            Some(existing) => {
                let old_status = existing.status;
                self.issues.update(&existing.id, &mapped, now).await?;
                self.issues
                    .append_history(&existing.id, event, &raw_payload, now)
                    .await?;

                if old_status != mapped.status && status::is_resolved(mapped.status) {
                    self.queue_resolution_notifications(&existing.id).await?;
                }

                info!(issue_id = %existing.id, external_id = %mapped.external_id, "issue updated");
                Ok(WebhookOutcome {
                    success: true,
                    issue_id: existing.id,
                    action: WebhookAction::Updated,
                })
            }
        }
    }

    /// Enqueue a resolution notice for every subscriber that holds a
    /// conversation and has not already been resolved.
    async fn queue_resolution_notifications(&self, issue_id: &str) -> Result<()> {
        let awaiting = self.subscribers.list_awaiting_resolution(issue_id).await?;
        if awaiting.is_empty() {
            return Ok(());
        }

        let count = awaiting.len();
        for subscriber in awaiting {
            self.queue
                .enqueue(
                    QueueKind::Resolved,
                    &subscriber.id,
                    issue_id,
                    subscriber.conversation_id.as_deref(),
                )
                .await?;
        }

        info!(issue_id, count, "queued resolution notifications");
        Ok(())
    }
}
