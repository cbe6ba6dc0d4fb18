//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS issue (
    id              TEXT PRIMARY KEY NOT NULL,
    external_id     TEXT NOT NULL UNIQUE,
    title           TEXT NOT NULL,
    content         TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL CHECK(status IN ('draft','publish','done','closed','archived')),
    event_type      TEXT NOT NULL DEFAULT '',
    project         TEXT NOT NULL DEFAULT '',
    issue_type      TEXT NOT NULL DEFAULT '',
    priority        TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_history (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id        TEXT NOT NULL,
    event           TEXT NOT NULL,
    payload         TEXT NOT NULL,
    received_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriber (
    id              TEXT PRIMARY KEY NOT NULL,
    issue_id        TEXT NOT NULL,
    email           TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending','notified','resolved_notification_sent')),
    approved        INTEGER NOT NULL DEFAULT 0,
    conversation_id TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE(issue_id, email)
);

CREATE TABLE IF NOT EXISTS queue_item (
    queue           TEXT NOT NULL CHECK(queue IN ('signup','resolved')),
    position        INTEGER NOT NULL,
    subscriber_id   TEXT NOT NULL,
    issue_id        TEXT NOT NULL,
    conversation_id TEXT,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    next_attempt_at TEXT NOT NULL,
    last_error      TEXT,
    PRIMARY KEY (queue, position)
);

CREATE TABLE IF NOT EXISTS failed_item (
    position        INTEGER PRIMARY KEY NOT NULL,
    original_kind   TEXT NOT NULL CHECK(original_kind IN ('signup','resolved')),
    subscriber_id   TEXT NOT NULL,
    issue_id        TEXT NOT NULL,
    conversation_id TEXT,
    retry_count     INTEGER NOT NULL,
    last_error      TEXT,
    failed_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS oauth_token (
    id              INTEGER PRIMARY KEY CHECK(id = 1),
    token           TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);
";

    for statement in ddl.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }

    Ok(())
}
