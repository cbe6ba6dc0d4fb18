//! Persisted OAuth token cache.
//!
//! A single-row table so a restart does not force a token exchange
//! while the previous token is still valid.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{AppError, Result};

use super::db::Database;

/// Cached OAuth access token with its adjusted expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token value.
    pub token: String,
    /// Expiry with the safety margin already subtracted.
    pub expires_at: DateTime<Utc>,
}

/// Repository wrapper around the single-row `oauth_token` table.
#[derive(Clone)]
pub struct TokenRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    token: String,
    expires_at: String,
}

impl TokenRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    pub async fn load(&self) -> Result<Option<AccessToken>> {
        let row: Option<TokenRow> =
            sqlx::query_as("SELECT token, expires_at FROM oauth_token WHERE id = 1")
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(|row| {
            let expires_at = DateTime::parse_from_rfc3339(&row.expires_at)
                .map_err(|err| AppError::Db(format!("invalid expires_at: {err}")))?
                .with_timezone(&Utc);
            Ok(AccessToken {
                token: row.token,
                expires_at,
            })
        })
        .transpose()
    }

    /// Replace the persisted token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn save(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_token (id, token, expires_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET token = excluded.token,
             expires_at = excluded.expires_at",
        )
        .bind(&token.token)
        .bind(token.expires_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Drop the persisted token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM oauth_token WHERE id = 1")
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
