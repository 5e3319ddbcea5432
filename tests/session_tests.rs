//! Tests for the session renewal endpoints.
//!
//! Covers the refresh rotation flow, expired/unknown refresh token
//! rejection, logout revocation and owner isolation.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use fleetgate::{
    ServerConfig,
    api::open_session,
    create_app,
    db::{Database, Role},
    token::TokenCodec,
};
use std::collections::BTreeSet;
use tower::ServiceExt;

const TEST_SECRET: &[u8] = b"test-token-secret-for-session-tests";

async fn create_test_app() -> (axum::Router, Database, TokenCodec) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    db.users()
        .create("alice", &BTreeSet::from([Role::Driver]))
        .await
        .expect("Failed to create user");

    let config = ServerConfig {
        db: db.clone(),
        token_secret: TEST_SECRET.to_vec(),
        access_token_ttl_secs: 3600,
    };
    (create_app(&config), db, TokenCodec::new(TEST_SECRET))
}

fn post_json(path: &str, bearer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let (app, db, codec) = create_test_app().await;

    let session = open_session(&db, &codec, "alice").await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let new_refresh = json["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, session.refresh_token);
    assert!(json["access_token"].as_str().is_some());

    // The new access token authenticates
    let token = json["access_token"].as_str().unwrap();
    assert_eq!(codec.decode(token).unwrap(), "alice");

    // The presented value was single-use
    let replay = app
        .clone()
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    // But the rotated value works
    let rotated = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": new_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(rotated.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_replays_redeem_exactly_once() {
    let (app, db, codec) = create_test_app().await;

    let session = open_session(&db, &codec, "alice").await.unwrap();

    // All replays share one refresh token value; the row delete decides the
    // winner, so exactly one may succeed.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let body = serde_json::json!({ "refresh_token": session.refresh_token });
        handles.push(tokio::spawn(async move {
            app.oneshot(post_json("/api/session/refresh", None, body))
                .await
                .unwrap()
                .status()
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            succeeded += 1;
        } else {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
    assert_eq!(succeeded, 1);
}

#[tokio::test]
async fn test_refresh_unknown_token_rejected() {
    let (app, _db, _codec) = create_test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": "no-such-token" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_expired_record_rejected_and_removed() {
    let (app, db, _codec) = create_test_app().await;

    let user = db.users().get_by_username("alice").await.unwrap().unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    db.refresh_tokens()
        .create("stale-token", user.id, now - 100, now - 10)
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": "stale-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The stale row is gone
    assert!(db
        .refresh_tokens()
        .get_by_value("stale-token")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_refresh_for_deactivated_user_rejected() {
    let (app, db, codec) = create_test_app().await;

    let session = open_session(&db, &codec, "alice").await.unwrap();
    let user = db.users().get_by_username("alice").await.unwrap().unwrap();
    db.users().deactivate(user.id).await.unwrap();

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, db, codec) = create_test_app().await;

    let session = open_session(&db, &codec, "alice").await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/session/logout",
            Some(&session.access_token),
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Revoked token can no longer refresh
    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let (app, db, codec) = create_test_app().await;

    let session = open_session(&db, &codec, "alice").await.unwrap();

    let response = app
        .oneshot(post_json(
            "/api/session/logout",
            None,
            serde_json::json!({ "refresh_token": session.refresh_token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_cannot_revoke_foreign_token() {
    let (app, db, codec) = create_test_app().await;

    db.users()
        .create("bob", &BTreeSet::from([Role::Driver]))
        .await
        .unwrap();

    let alice_session = open_session(&db, &codec, "alice").await.unwrap();
    let bob_session = open_session(&db, &codec, "bob").await.unwrap();

    // bob tries to revoke alice's refresh token
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/session/logout",
            Some(&bob_session.access_token),
            serde_json::json!({ "refresh_token": alice_session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // alice's token still refreshes
    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": alice_session.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_open_session_unknown_user() {
    let (_app, db, codec) = create_test_app().await;

    assert!(open_session(&db, &codec, "carol").await.is_err());
}

#[tokio::test]
async fn test_multiple_sessions_per_user() {
    let (app, db, codec) = create_test_app().await;

    let s1 = open_session(&db, &codec, "alice").await.unwrap();
    let s2 = open_session(&db, &codec, "alice").await.unwrap();
    assert_ne!(s1.refresh_token, s2.refresh_token);

    let user = db.users().get_by_username("alice").await.unwrap().unwrap();
    let live = db.refresh_tokens().list_by_user(user.id).await.unwrap();
    assert_eq!(live.len(), 2);

    // Refreshing one session leaves the other intact
    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            None,
            serde_json::json!({ "refresh_token": s1.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(db
        .refresh_tokens()
        .get_by_value(&s2.refresh_token)
        .await
        .unwrap()
        .is_some());
}
