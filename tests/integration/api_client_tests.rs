//! Response classification of the real HTTP client and token refresh,
//! driven against a local listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{patch, post};
use axum::{Json, Router};
use chrono::Duration;
use serde_json::{json, Value};

use issue_relay::clock::{Clock, ManualClock};
use issue_relay::config::HelpScoutConfig;
use issue_relay::helpscout::api::{ConversationApi, HelpScoutClient};
use issue_relay::helpscout::token::TokenManager;
use issue_relay::models::issue::IssueStatus;
use issue_relay::models::queue::QueueKind;
use issue_relay::persistence::token_repo::{AccessToken, TokenRepo};
use issue_relay::state::AppState;
use issue_relay::AppError;

use super::test_helpers::{seed_issue, start_time, test_config, test_db};

/// Serve a router on an ephemeral local port; returns the base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Token endpoint that always succeeds, counting how often it is hit.
fn token_route(hits: Arc<AtomicUsize>, expires_in: i64) -> Router {
    Router::new().route(
        "/token",
        post(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "access_token": "tok-1", "expires_in": expires_in }))
            }
        }),
    )
}

fn remote_config(base: &str) -> HelpScoutConfig {
    HelpScoutConfig {
        mailbox_id: 123_456,
        token_url: format!("{base}/token"),
        api_url: base.to_owned(),
        app_id: "app-id".to_owned(),
        app_secret: "app-secret".to_owned(),
    }
}

/// Client wired to the given base URL with a fresh token manager.
async fn client_for(base: &str) -> HelpScoutClient {
    let db = test_db().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let tokens = TokenManager::new(remote_config(base), TokenRepo::new(db), clock)
        .expect("token manager");
    HelpScoutClient::new(base.to_owned(), Arc::new(tokens)).expect("client")
}

async fn rate_limited() -> impl IntoResponse {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "17")],
        "slow down",
    )
}

#[tokio::test]
async fn http_429_maps_to_rate_limited_with_the_retry_after_hint() {
    let router = token_route(Arc::new(AtomicUsize::new(0)), 3600)
        .route("/conversations", post(rate_limited));
    let base = serve(router).await;
    let client = client_for(&base).await;

    let err = client
        .create_conversation(json!({ "subject": "hello" }))
        .await
        .expect_err("rate limited");
    let AppError::RateLimited(hint) = err else {
        panic!("expected RateLimited, got {err:?}");
    };
    assert_eq!(hint, "17");
}

#[tokio::test]
async fn empty_success_body_yields_null_not_failure() {
    let router = token_route(Arc::new(AtomicUsize::new(0)), 3600).route(
        "/conversations/{id}",
        patch(|| async { StatusCode::NO_CONTENT }),
    );
    let base = serve(router).await;
    let client = client_for(&base).await;

    let body = client
        .update_conversation("42", json!({ "status": "closed" }))
        .await
        .expect("empty 2xx is success");
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn non_429_error_status_maps_to_api_error() {
    let router = token_route(Arc::new(AtomicUsize::new(0)), 3600).route(
        "/conversations",
        post(|| async { (StatusCode::BAD_REQUEST, "mailbox required") }),
    );
    let base = serve(router).await;
    let client = client_for(&base).await;

    let err = client
        .create_conversation(json!({}))
        .await
        .expect_err("400 is a failure");
    let AppError::Api(msg) = err else {
        panic!("expected Api, got {err:?}");
    };
    assert!(msg.contains("400"), "got {msg}");
    assert!(msg.contains("mailbox required"), "got {msg}");
}

#[tokio::test]
async fn refresh_caches_the_token_with_the_safety_margin() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(token_route(Arc::clone(&hits), 1000)).await;

    let db = test_db().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let repo = TokenRepo::new(Arc::clone(&db));
    let manager = TokenManager::new(remote_config(&base), TokenRepo::new(db), clock)
        .expect("token manager");

    assert_eq!(manager.get_token().await.expect("token"), "tok-1");

    // Persisted expiry is the provider's expires_in less the margin.
    let persisted = repo.load().await.expect("load").expect("persisted token");
    assert_eq!(
        persisted,
        AccessToken {
            token: "tok-1".to_owned(),
            expires_at: start_time() + Duration::seconds(1000 - 300),
        }
    );

    // Second call is served from cache without touching the endpoint.
    assert_eq!(manager.get_token().await.expect("token"), "tok-1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn token_endpoint_error_status_maps_to_auth() {
    let router = Router::new().route(
        "/token",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oauth down") }),
    );
    let base = serve(router).await;

    let db = test_db().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let manager = TokenManager::new(remote_config(&base), TokenRepo::new(db), clock)
        .expect("token manager");

    let err = manager.get_token().await.expect_err("refresh fails");
    assert!(matches!(err, AppError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn token_response_without_access_token_maps_to_auth() {
    let router = Router::new().route(
        "/token",
        post(|| async { Json(json!({ "token_type": "bearer" })) }),
    );
    let base = serve(router).await;

    let db = test_db().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let manager = TokenManager::new(remote_config(&base), TokenRepo::new(db), clock)
        .expect("token manager");

    let err = manager.get_token().await.expect_err("no token in body");
    assert!(matches!(err, AppError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn rate_limited_delivery_lands_back_in_the_queue_with_backoff() {
    let router = token_route(Arc::new(AtomicUsize::new(0)), 86_400)
        .route("/conversations", post(rate_limited));
    let base = serve(router).await;

    let mut config = test_config();
    config.helpscout = remote_config(&base);
    let config = Arc::new(config);

    let db = test_db().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let tokens = TokenManager::new(
        config.helpscout.clone(),
        TokenRepo::new(Arc::clone(&db)),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .expect("token manager");
    let client = Arc::new(
        HelpScoutClient::new(config.helpscout.api_url.clone(), Arc::new(tokens))
            .expect("client"),
    );
    let state =
        AppState::build(config, db, client, Arc::clone(&clock) as Arc<dyn Clock>)
            .expect("state builds");

    let issue_id = seed_issue(&state, "OPS-1", IssueStatus::Publish).await;
    let subscriber = state
        .subscribers
        .create(&issue_id, "ada@example.com", start_time())
        .await
        .expect("subscriber");
    state
        .queue
        .enqueue(QueueKind::Signup, &subscriber.id, &issue_id, None)
        .await
        .expect("enqueue");

    let outcome = state.processor.process_queues(10).await.expect("run");
    assert_eq!(outcome.signup.processed, 1);
    assert_eq!(outcome.signup.failed, 1);

    // Still queued, not dead-lettered, and not ready before the first
    // backoff interval elapses.
    let stats = state.queue.get_stats().await.expect("stats");
    assert_eq!(stats.signup_pending, 1);
    assert_eq!(stats.failed, 0);

    clock.advance(Duration::minutes(4));
    let ready = state
        .queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("batch");
    assert!(ready.is_empty(), "not ready before the 5 minute backoff");

    clock.advance(Duration::minutes(1));
    let ready = state
        .queue
        .get_ready_batch(QueueKind::Signup, 10)
        .await
        .expect("batch");
    assert_eq!(ready.len(), 1);
    let (_, item) = &ready[0];
    assert_eq!(item.retry_count, 1);
    let error = item.last_error.as_deref().expect("recorded error");
    assert!(error.contains("rate limited"), "got {error}");
}
