//! OAuth token lifecycle for the Help Scout Mailbox API.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::HelpScoutConfig;
use crate::persistence::token_repo::{AccessToken, TokenRepo};
use crate::{AppError, Result};

/// Margin subtracted from the provider's stated expiry so the cache
/// never serves a token within five minutes of real expiry.
const EXPIRY_SAFETY_MARGIN: Duration = Duration::seconds(300);

/// Default `expires_in` when the provider omits it (two hours).
const DEFAULT_EXPIRES_IN: i64 = 7200;

const TOKEN_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Acquires and caches the OAuth access token, refreshing on expiry.
///
/// The token lives in memory and in the `oauth_token` table so a
/// restart reuses a still-valid token. Refresh is idempotent: two
/// concurrent refreshes both succeed and the last write wins, so no
/// lock is held across the HTTP exchange.
pub struct TokenManager {
    http: reqwest::Client,
    config: HelpScoutConfig,
    repo: TokenRepo,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenManager {
    /// Create a manager for the configured Help Scout app.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: HelpScoutConfig, repo: TokenRepo, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            config,
            repo,
            clock,
            cached: RwLock::new(None),
        })
    }

    /// Return a valid access token, refreshing if the cached one has
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` on missing credentials or a token
    /// response without an access token, `AppError::Transport` on
    /// network failure, `AppError::Db` if the persisted cache is
    /// unreadable.
    pub async fn get_token(&self) -> Result<String> {
        let now = self.clock.now();

        if let Some(token) = self.cached.read().await.as_ref() {
            if now < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        // A prior process may have left a still-valid token behind.
        if let Some(token) = self.repo.load().await? {
            if now < token.expires_at {
                let value = token.token.clone();
                *self.cached.write().await = Some(token);
                debug!("reusing persisted helpscout token");
                return Ok(value);
            }
        }

        self.refresh().await
    }

    /// Perform a client-credentials exchange and cache the result.
    ///
    /// No retry here; callers treat failure as a single unit of failure
    /// for the surrounding API call. The cache is not mutated on error.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::get_token`].
    pub async fn refresh(&self) -> Result<String> {
        if self.config.app_id.is_empty() || self.config.app_secret.is_empty() {
            return Err(AppError::Auth("helpscout credentials not configured".into()));
        }

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Auth(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| AppError::Auth(format!("invalid token response: {err}")))?;
        let Some(access_token) = body["access_token"].as_str().filter(|t| !t.is_empty()) else {
            return Err(AppError::Auth("token response missing access_token".into()));
        };
        let expires_in = body["expires_in"].as_i64().unwrap_or(DEFAULT_EXPIRES_IN);

        let token = AccessToken {
            token: access_token.to_owned(),
            expires_at: self.clock.now() + Duration::seconds(expires_in) - EXPIRY_SAFETY_MARGIN,
        };
        self.repo.save(&token).await?;
        let value = token.token.clone();
        *self.cached.write().await = Some(token);

        info!("helpscout access token refreshed");
        Ok(value)
    }

    /// Drop the cached token, forcing a refresh on next use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the persisted cache cannot be cleared.
    pub async fn clear(&self) -> Result<()> {
        *self.cached.write().await = None;
        self.repo.clear().await
    }
}
