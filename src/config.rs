//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Help Scout Mailbox API connectivity settings.
///
/// The OAuth app id and secret are loaded at runtime via OS keychain or
/// environment variables, not from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HelpScoutConfig {
    /// Mailbox that owns the notification conversations.
    pub mailbox_id: i64,
    /// OAuth2 client-credentials token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Mailbox API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// OAuth application id (populated at runtime).
    #[serde(skip)]
    pub app_id: String,
    /// OAuth application secret (populated at runtime).
    #[serde(skip)]
    pub app_secret: String,
}

fn default_token_url() -> String {
    "https://api.helpscout.net/v2/oauth2/token".into()
}

fn default_api_url() -> String {
    "https://api.helpscout.net/v2".into()
}

/// Inbound Jira webhook authentication settings.
///
/// Both secrets are loaded at runtime, never from the TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WebhookConfig {
    /// Shared secret for the HMAC signature over the raw body.
    #[serde(skip)]
    pub hmac_secret: String,
    /// Shared secret expected in the `secret` query parameter.
    #[serde(skip)]
    pub url_secret: String,
}

/// Batch processing cadence and sizing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Items pulled per queue per run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds between scheduled batch runs.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Pause between items within a batch, to respect API rate limits.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            interval_seconds: default_interval_seconds(),
            item_delay_ms: default_item_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_item_delay_ms() -> u64 {
    100
}

/// Notification message templates.
///
/// Placeholders `{title}`, `{permalink}`, and `{status}` are substituted
/// at send time. Replaces the ambient filter hooks of the original
/// system with explicit configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MessageConfig {
    /// Body of the signup confirmation conversation.
    #[serde(default = "default_signup_template")]
    pub signup_template: String,
    /// Body of the resolution note thread.
    #[serde(default = "default_resolution_template")]
    pub resolution_template: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            signup_template: default_signup_template(),
            resolution_template: default_resolution_template(),
        }
    }
}

fn default_signup_template() -> String {
    "This confirms you're now tracking the known issue: {title}\n\n\
     You'll receive an update when this issue is resolved.\n\n\
     Issue Details: {permalink}"
        .into()
}

fn default_resolution_template() -> String {
    "Good news! The known issue you were tracking has been resolved.\n\n\
     Issue: {title}\nStatus: {status}\n\nView details: {permalink}"
        .into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Base URL used to build issue permalinks in notification bodies.
    pub site_base_url: String,
    /// HTTP port for the webhook and subscription routes.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Help Scout connectivity settings.
    pub helpscout: HelpScoutConfig,
    /// Inbound webhook authentication settings.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Batch processing settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Notification message templates.
    #[serde(default)]
    pub messages: MessageConfig,
    /// Jira status name overrides merged over the built-in mapping table.
    #[serde(default)]
    pub status_map: HashMap<String, String>,
}

fn default_http_port() -> u16 {
    3000
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Help Scout and webhook secrets from OS keychain with
    /// env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars
    /// provide a required secret.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.helpscout.app_id = load_credential("helpscout_app_id", "HELPSCOUT_APP_ID").await?;
        self.helpscout.app_secret =
            load_credential("helpscout_app_secret", "HELPSCOUT_APP_SECRET").await?;
        self.webhook.hmac_secret =
            load_credential("jira_webhook_secret", "JIRA_WEBHOOK_SECRET").await?;
        self.webhook.url_secret =
            load_credential("jira_webhook_url_secret", "JIRA_WEBHOOK_URL_SECRET").await?;
        Ok(())
    }

    /// Permalink for an issue, derived from the configured site base URL.
    #[must_use]
    pub fn issue_permalink(&self, issue_id: &str) -> String {
        format!("{}/issues/{issue_id}", self.site_base_url.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<()> {
        if self.site_base_url.is_empty() {
            return Err(AppError::Config("site_base_url must not be empty".into()));
        }
        if self.helpscout.mailbox_id <= 0 {
            return Err(AppError::Config(
                "helpscout.mailbox_id must be a positive id".into(),
            ));
        }
        if self.queue.batch_size == 0 {
            return Err(AppError::Config(
                "queue.batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Keyring does synchronous I/O; keep it off the async worker.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new("issue-relay", &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or ${env_key}"
        ))
    })
}
