//! Builds and sends the two notification kinds, recording delivery
//! state on the subscriber record.
//!
//! Pure with respect to the queues: failures are reported to the
//! caller, which owns retry and dead-letter policy.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::models::issue::Issue;
use crate::models::subscriber::Subscriber;
use crate::persistence::issue_repo::IssueRepo;
use crate::persistence::subscriber_repo::SubscriberRepo;
use crate::{AppError, Result};

use super::api::ConversationApi;

/// Sends signup confirmations and resolution notices.
pub struct NotificationHandler {
    api: Arc<dyn ConversationApi>,
    issues: IssueRepo,
    subscribers: SubscriberRepo,
    config: Arc<GlobalConfig>,
}

impl NotificationHandler {
    /// Create a handler over the shared API client and stores.
    #[must_use]
    pub fn new(
        api: Arc<dyn ConversationApi>,
        issues: IssueRepo,
        subscribers: SubscriberRepo,
        config: Arc<GlobalConfig>,
    ) -> Self {
        Self {
            api,
            issues,
            subscribers,
            config,
        }
    }

    /// Create the signup confirmation conversation and record its id
    /// plus a `notified` status on the subscriber.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for a missing subscriber or issue,
    /// API/transport errors from the conversation call, `AppError::Api`
    /// if no conversation id could be extracted, or `AppError::Db` if
    /// recording the delivery fails. All are absorbed into per-item
    /// retry state by the batch processor.
    pub async fn send_signup_notification(
        &self,
        subscriber_id: &str,
        issue_id: &str,
    ) -> Result<()> {
        let (subscriber, issue) = self.load_pair(subscriber_id, issue_id).await?;

        let text = self.render_signup_message(&issue);
        let data = json!({
            "subject": format!("You're now tracking: {}", issue.title),
            "mailboxId": self.config.helpscout.mailbox_id,
            "type": "email",
            "status": "active",
            "customer": { "email": subscriber.email },
            "threads": [{
                "type": "customer",
                "customer": { "email": subscriber.email },
                "text": text,
            }],
        });

        let response = self.api.create_conversation(data).await?;
        let Some(conversation_id) = extract_conversation_id(&response) else {
            warn!(subscriber_id, "conversation created but no id returned");
            return Err(AppError::Api(
                "conversation created but no id returned".into(),
            ));
        };

        self.subscribers
            .set_conversation(subscriber_id, &conversation_id)
            .await?;
        info!(subscriber_id, conversation_id, "signup notification sent");
        Ok(())
    }

    /// Post the closing note into the subscriber's conversation and
    /// transition the record to its approved terminal state.
    ///
    /// # Errors
    ///
    /// As [`NotificationHandler::send_signup_notification`], plus
    /// `AppError::Validation` when `conversation_id` is empty.
    pub async fn send_resolution_notification(
        &self,
        subscriber_id: &str,
        issue_id: &str,
        conversation_id: &str,
    ) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(AppError::Validation(format!(
                "missing conversation id for subscriber {subscriber_id}"
            )));
        }
        let (_, issue) = self.load_pair(subscriber_id, issue_id).await?;

        let data = json!({
            "type": "note",
            "text": self.render_resolution_message(&issue),
            "status": "closed",
        });
        self.api.create_thread(conversation_id, data).await?;

        self.subscribers.mark_resolution_sent(subscriber_id).await?;
        info!(subscriber_id, conversation_id, "resolution notification sent");
        Ok(())
    }

    async fn load_pair(&self, subscriber_id: &str, issue_id: &str) -> Result<(Subscriber, Issue)> {
        let subscriber = self
            .subscribers
            .get(subscriber_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscriber {subscriber_id} not found")))?;
        let issue = self
            .issues
            .get(issue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("issue {issue_id} not found")))?;
        Ok((subscriber, issue))
    }

    fn render_signup_message(&self, issue: &Issue) -> String {
        render(
            &self.config.messages.signup_template,
            issue,
            &self.config.issue_permalink(&issue.id),
        )
    }

    fn render_resolution_message(&self, issue: &Issue) -> String {
        render(
            &self.config.messages.resolution_template,
            issue,
            &self.config.issue_permalink(&issue.id),
        )
    }
}

fn render(template: &str, issue: &Issue, permalink: &str) -> String {
    template
        .replace("{title}", &issue.title)
        .replace("{permalink}", permalink)
        .replace("{status}", issue.status.label())
}

/// Pull the new conversation id from either the top-level `id` or the
/// embedded conversation list, accepting numeric or string ids.
fn extract_conversation_id(response: &Value) -> Option<String> {
    value_as_id(&response["id"])
        .or_else(|| value_as_id(&response["_embedded"]["conversations"][0]["id"]))
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
