//! Integration tests for the admin login/verify/logout cycle.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::json;
use visage_core::{AdminAuthClient, ConversationStore, RemoteError};

async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn open_store() -> (tempfile::TempDir, ConversationStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::open_path(dir.path()).unwrap();
    (dir, store)
}

#[tokio::test]
async fn login_persists_token_and_raises_session_flag() {
    let expires = Utc::now() + Duration::hours(1);
    let expires_wire = expires.to_rfc3339();
    let base = spawn_mock(Router::new().route(
        "/admin/login",
        post(move || async move { Json(json!({"token": "tok-123", "expiresAt": expires_wire})) }),
    ))
    .await;
    let (_dir, store) = open_store();
    let client = AdminAuthClient::new(format!("{base}/admin"));

    let outcome = client.login(&store, "sesame").await.unwrap();
    assert_eq!(outcome.token, "tok-123");

    let session = store.admin_session();
    assert!(session.authenticated);
    assert_eq!(session.token.as_deref(), Some("tok-123"));
    assert!(!store.is_admin_token_expired());
}

#[tokio::test]
async fn blank_code_fails_before_any_network_call() {
    let (_dir, store) = open_store();
    // Deliberately unusable endpoint: a blank code must never reach it.
    let client = AdminAuthClient::new("http://127.0.0.1:9/admin");

    let err = client.login(&store, "   ").await.unwrap_err();
    assert!(matches!(err, RemoteError::Validation(_)), "{err:?}");
    assert!(!store.admin_session().authenticated);
    assert!(store.admin_session().token.is_none());
}

#[tokio::test]
async fn rejected_code_surfaces_the_upstream_message() {
    let base = spawn_mock(Router::new().route(
        "/admin/login",
        post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid code"}))) }),
    ))
    .await;
    let (_dir, store) = open_store();
    let client = AdminAuthClient::new(format!("{base}/admin"));

    let err = client.login(&store, "wrong").await.unwrap_err();
    match err {
        RemoteError::Upstream { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid code");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert!(!store.admin_session().authenticated);
}

#[tokio::test]
async fn expired_local_token_short_circuits_verification() {
    let (_dir, store) = open_store();
    store
        .set_admin_token("stale", Utc::now() - Duration::hours(1))
        .unwrap();
    // Unusable endpoint: the local expiry check must win before any request.
    let client = AdminAuthClient::new("http://127.0.0.1:9/admin");

    let err = client.verify(&store).await.unwrap_err();
    assert!(matches!(err, RemoteError::AuthExpired), "{err:?}");
    assert!(store.admin_session().token.is_none(), "stale token is cleared");
}

#[tokio::test]
async fn remote_401_clears_the_token() {
    let base = spawn_mock(Router::new().route(
        "/admin/session",
        get(|| async { StatusCode::UNAUTHORIZED }),
    ))
    .await;
    let (_dir, store) = open_store();
    store
        .set_admin_token("revoked", Utc::now() + Duration::hours(1))
        .unwrap();
    let client = AdminAuthClient::new(format!("{base}/admin"));

    let err = client.verify(&store).await.unwrap_err();
    assert!(matches!(err, RemoteError::AuthExpired), "{err:?}");
    assert!(
        store.admin_session().token.is_none(),
        "401 must clear the local token"
    );
}

#[tokio::test]
async fn remote_403_keeps_the_token() {
    let base = spawn_mock(Router::new().route(
        "/admin/session",
        get(|| async { StatusCode::FORBIDDEN }),
    ))
    .await;
    let (_dir, store) = open_store();
    store
        .set_admin_token("limited", Utc::now() + Duration::hours(1))
        .unwrap();
    let client = AdminAuthClient::new(format!("{base}/admin"));

    let err = client.verify(&store).await.unwrap_err();
    assert!(matches!(err, RemoteError::Permission), "{err:?}");
    assert_eq!(
        store.admin_session().token.as_deref(),
        Some("limited"),
        "403 must not clear the token"
    );
}

#[tokio::test]
async fn valid_token_verifies_against_the_session_endpoint() {
    let base = spawn_mock(Router::new().route(
        "/admin/session",
        get(|headers: HeaderMap| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "Bearer tok-ok")
                .unwrap_or(false);
            if authorized {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::UNAUTHORIZED
            }
        }),
    ))
    .await;
    let (_dir, store) = open_store();
    store
        .set_admin_token("tok-ok", Utc::now() + Duration::hours(1))
        .unwrap();
    let client = AdminAuthClient::new(format!("{base}/admin"));

    client.verify(&store).await.unwrap();
}

#[tokio::test]
async fn logout_drops_token_and_flag() {
    let (_dir, store) = open_store();
    store
        .set_admin_token("tok", Utc::now() + Duration::hours(1))
        .unwrap();
    store.set_admin_authenticated(true);
    let client = AdminAuthClient::new("http://127.0.0.1:9/admin");

    client.logout(&store);

    let session = store.admin_session();
    assert!(!session.authenticated);
    assert!(session.token.is_none());
}
