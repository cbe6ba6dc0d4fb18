//! Stateless request wrapper over the Help Scout Mailbox API.
//!
//! No retries live here; retry policy belongs to the queue manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{AppError, Result};

use super::token::TokenManager;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversation operations the notifier needs from the external API.
///
/// The production implementation is [`HelpScoutClient`]; tests inject
/// stubs.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Create a conversation; returns the parsed response body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RateLimited` on HTTP 429, `AppError::Api` on
    /// other error statuses, `AppError::Transport` on network failure,
    /// or the token error if no access token could be obtained.
    async fn create_conversation(&self, data: Value) -> Result<Value>;

    /// Add a thread (reply or note) to an existing conversation.
    ///
    /// # Errors
    ///
    /// See [`ConversationApi::create_conversation`].
    async fn create_thread(&self, conversation_id: &str, data: Value) -> Result<Value>;

    /// Fetch a conversation.
    ///
    /// # Errors
    ///
    /// See [`ConversationApi::create_conversation`].
    async fn get_conversation(&self, conversation_id: &str) -> Result<Value>;

    /// Patch fields on an existing conversation.
    ///
    /// # Errors
    ///
    /// See [`ConversationApi::create_conversation`].
    async fn update_conversation(&self, conversation_id: &str, data: Value) -> Result<Value>;

    /// Cheap connectivity probe for the operator surface.
    ///
    /// # Errors
    ///
    /// See [`ConversationApi::create_conversation`].
    async fn test_connection(&self) -> Result<()>;
}

/// Mailbox API 2.0 client with bearer authentication.
pub struct HelpScoutClient {
    http: reqwest::Client,
    api_url: String,
    tokens: Arc<TokenManager>,
}

impl HelpScoutClient {
    /// Create a client rooted at the configured API base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, tokens: Arc<TokenManager>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            tokens,
        })
    }

    /// Issue one authenticated request and classify the response.
    ///
    /// 2xx with a body parses to JSON; 2xx with an empty body yields
    /// `Value::Null` (success, distinct from failure); 429 maps to
    /// `RateLimited`; other 4xx/5xx map to `Api`.
    async fn request(&self, method: Method, endpoint: &str, data: Option<Value>) -> Result<Value> {
        let token = self.tokens.get_token().await?;
        let url = format!("{}{endpoint}", self.api_url);

        debug!(%method, endpoint, "helpscout api request");

        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = data {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_owned();
            // Backoff is the queue manager's responsibility, not ours.
            warn!(endpoint, retry_after, "helpscout api rate limited");
            return Err(AppError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Api(format!("{status}: {body}")));
        }

        debug!(endpoint, status = status.as_u16(), "helpscout api response");
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| AppError::Api(format!("invalid response body: {err}")))
    }
}

#[async_trait]
impl ConversationApi for HelpScoutClient {
    async fn create_conversation(&self, data: Value) -> Result<Value> {
        self.request(Method::POST, "/conversations", Some(data)).await
    }

    async fn create_thread(&self, conversation_id: &str, data: Value) -> Result<Value> {
        self.request(
            Method::POST,
            &format!("/conversations/{conversation_id}/threads"),
            Some(data),
        )
        .await
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/conversations/{conversation_id}"), None)
            .await
    }

    async fn update_conversation(&self, conversation_id: &str, data: Value) -> Result<Value> {
        self.request(
            Method::PATCH,
            &format!("/conversations/{conversation_id}"),
            Some(data),
        )
        .await
    }

    async fn test_connection(&self) -> Result<()> {
        self.request(Method::GET, "/mailboxes", None).await.map(|_| ())
    }
}
