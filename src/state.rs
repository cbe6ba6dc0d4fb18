//! Explicitly constructed application context.
//!
//! Replaces the ambient singletons of the original system: every
//! component receives its collaborators here, at construction.

use std::sync::Arc;
use std::time::Duration;

use crate::batch::processor::BatchProcessor;
use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::helpscout::api::ConversationApi;
use crate::helpscout::notifier::NotificationHandler;
use crate::jira::status::StatusMapper;
use crate::jira::webhook::WebhookHandler;
use crate::persistence::db::Database;
use crate::persistence::issue_repo::IssueRepo;
use crate::persistence::subscriber_repo::SubscriberRepo;
use crate::queue::QueueManager;
use crate::Result;

/// Shared application state handed to the HTTP surface, the batch
/// scheduler, and the operator commands.
pub struct AppState {
    /// Parsed global configuration.
    pub config: Arc<GlobalConfig>,
    /// Shared database pool.
    pub db: Arc<Database>,
    /// Issue entity store.
    pub issues: IssueRepo,
    /// Subscriber store.
    pub subscribers: SubscriberRepo,
    /// Durable notification queues.
    pub queue: Arc<QueueManager>,
    /// Inbound webhook processor.
    pub webhook: WebhookHandler,
    /// Batch delivery driver.
    pub processor: Arc<BatchProcessor>,
    /// Conversation API used for operator connectivity checks.
    pub api: Arc<dyn ConversationApi>,
    /// Shared time source.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the full component graph over an injected API client and
    /// clock. Production passes `HelpScoutClient` and `SystemClock`;
    /// tests substitute stubs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the status map overrides are
    /// invalid.
    pub fn build(
        config: Arc<GlobalConfig>,
        db: Arc<Database>,
        api: Arc<dyn ConversationApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let statuses = StatusMapper::with_overrides(&config.status_map)?;
        let issues = IssueRepo::new(Arc::clone(&db));
        let subscribers = SubscriberRepo::new(Arc::clone(&db));
        let queue = Arc::new(QueueManager::new(Arc::clone(&db), Arc::clone(&clock)));

        let webhook = WebhookHandler::new(
            config.webhook.clone(),
            statuses,
            issues.clone(),
            subscribers.clone(),
            Arc::clone(&queue),
            Arc::clone(&clock),
        );

        let notifier = Arc::new(NotificationHandler::new(
            Arc::clone(&api),
            issues.clone(),
            subscribers.clone(),
            Arc::clone(&config),
        ));
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&queue),
            notifier,
            Duration::from_millis(config.queue.item_delay_ms),
        ));

        Ok(Arc::new(Self {
            config,
            db,
            issues,
            subscribers,
            queue,
            webhook,
            processor,
            api,
            clock,
        }))
    }
}
