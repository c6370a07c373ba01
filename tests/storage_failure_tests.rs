//! Behaviour when the admin store or the session store is down.

mod common;

use std::sync::Arc;

use academy_admin::api;
use academy_admin::config::StorageBackend;
use academy_admin::storage::{AdminRecord, AdminStore, NewAdmin, StorageError};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{
    ALICE_EMAIL, ALICE_PASSWORD, mint_token, seeded_store, session_cookie, state_with_store,
    test_config,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::SessionStore;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;

struct UnavailableStore;

fn down() -> StorageError {
    StorageError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl AdminStore for UnavailableStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Err(down())
    }

    async fn find_by_email(&self, _email: &str) -> Result<Option<AdminRecord>, StorageError> {
        Err(down())
    }

    async fn find_by_username(
        &self,
        _username: &str,
    ) -> Result<Option<AdminRecord>, StorageError> {
        Err(down())
    }

    async fn is_empty(&self) -> Result<bool, StorageError> {
        Err(down())
    }

    async fn list(&self) -> Result<Vec<AdminRecord>, StorageError> {
        Err(down())
    }

    async fn insert(&self, _admin: NewAdmin) -> Result<AdminRecord, StorageError> {
        Err(down())
    }

    async fn update_password_hash(
        &self,
        _id: &str,
        _password_hash: &str,
    ) -> Result<(), StorageError> {
        Err(down())
    }
}

/// Session store whose every call fails.
#[derive(Debug, Clone)]
struct BrokenSessionStore;

#[async_trait]
impl SessionStore for BrokenSessionStore {
    async fn save(&self, _record: &Record) -> session_store::Result<()> {
        Err(session_store::Error::Backend("session db offline".to_string()))
    }

    async fn load(&self, _session_id: &Id) -> session_store::Result<Option<Record>> {
        Err(session_store::Error::Backend("session db offline".to_string()))
    }

    async fn delete(&self, _session_id: &Id) -> session_store::Result<()> {
        Err(session_store::Error::Backend("session db offline".to_string()))
    }
}

async fn unavailable_app() -> Router {
    let state = state_with_store(test_config(), Arc::new(UnavailableStore));
    api::router(state).await.unwrap()
}

async fn broken_sessions_app() -> Router {
    let config = test_config();
    let store = seeded_store(&config).await;
    let state = state_with_store(config, store);
    api::router_with_session_store(state, BrokenSessionStore)
}

async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn with_stale_cookie(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::COOKIE, format!("academy.sid={}", Id::default()))
}

#[tokio::test]
async fn test_password_login_with_store_down_is_server_error() {
    let app = unavailable_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "alice", "password": ALICE_PASSWORD }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(session_cookie(&response).is_none());

    let body = body_json(response).await;
    assert_eq!(body["code"], "storage_unavailable");
    assert!(body.get("data").is_none());
    assert!(!body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_token_login_with_store_down_writes_no_session() {
    let app = unavailable_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "idToken": mint_token(ALICE_EMAIL, None, 3600) }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_bearer_with_store_down_is_server_error() {
    let app = unavailable_app().await;

    let request = Request::builder()
        .uri("/api/admin/me")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", mint_token(ALICE_EMAIL, None, 3600)),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "storage_unavailable");
}

#[tokio::test]
async fn test_bearer_survives_session_store_failure() {
    let app = broken_sessions_app().await;

    let request = with_stale_cookie(Request::builder().uri("/api/admin/me"))
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", mint_token(ALICE_EMAIL, None, 3600)),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["username"], "alice");
}

#[tokio::test]
async fn test_session_store_failure_without_bearer_is_server_error() {
    let app = broken_sessions_app().await;

    let request = with_stale_cookie(Request::builder().uri("/api/admin/me"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_reports_store_down() {
    let app = unavailable_app().await;

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
