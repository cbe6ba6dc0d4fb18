//! Route handlers and error-to-status mapping.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::jira::webhook::WebhookAction;
use crate::models::queue::QueueKind;
use crate::state::AppState;
use crate::AppError;

/// Build the service router over the shared application state.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/jira", post(jira_webhook))
        .route("/affected-users", post(signup))
        .route("/affected-users/{id}", delete(unsubscribe))
        .route("/issues/{id}/affected-users", get(list_affected))
        .with_state(state)
}

/// Map a domain error to an HTTP response with a JSON error body.
fn error_response(err: &AppError) -> Response {
    let status = match err {
        AppError::Auth(_) => StatusCode::UNAUTHORIZED,
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[allow(clippy::unused_async)] // axum handlers must be async.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn jira_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("x-hub-signature")
        .and_then(|value| value.to_str().ok());
    let url_secret = params.get("secret").map(String::as_str);

    match state.webhook.handle(&body, signature, url_secret).await {
        Ok(outcome) => {
            let status = match outcome.action {
                WebhookAction::Created => StatusCode::CREATED,
                WebhookAction::Updated => StatusCode::OK,
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    issue_id: String,
    email: String,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Response {
    if request.email.is_empty() || !request.email.contains('@') {
        return error_response(&AppError::Validation("invalid email address".into()));
    }

    let issue = match state.issues.get(&request.issue_id).await {
        Ok(Some(issue)) => issue,
        Ok(None) => {
            return error_response(&AppError::NotFound(format!(
                "issue {} not found",
                request.issue_id
            )));
        }
        Err(err) => return error_response(&err),
    };

    let now = state.clock.now();
    let subscriber = match state.subscribers.create(&issue.id, &request.email, now).await {
        Ok(subscriber) => subscriber,
        Err(err) => return error_response(&err),
    };

    // Confirmation is delivered asynchronously by the batch processor.
    if let Err(err) = state
        .queue
        .enqueue(QueueKind::Signup, &subscriber.id, &issue.id, None)
        .await
    {
        return error_response(&err);
    }

    (StatusCode::CREATED, Json(subscriber)).into_response()
}

async fn unsubscribe(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if let Err(err) = state.subscribers.delete(&id).await {
        return error_response(&err);
    }
    // Drop any queued notifications so nothing fires after cancellation.
    if let Err(err) = state.queue.remove_for_subscriber(&id).await {
        return error_response(&err);
    }
    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

async fn list_affected(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.subscribers.list_for_issue(&id).await {
        Ok(subscribers) => Json(subscribers).into_response(),
        Err(err) => error_response(&err),
    }
}
