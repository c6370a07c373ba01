#![allow(dead_code)]

use academy_admin::api::{self, AppState};
use academy_admin::clients::FirebaseIdentityProvider;
use academy_admin::clients::firebase_auth::Jwk;
use academy_admin::config::{Config, SessionStoreKind};
use academy_admin::db::Store;
use academy_admin::services::password;
use academy_admin::state::SharedState;
use academy_admin::storage::{AdminStore, NewAdmin, SqliteAdminStore};
use axum::Router;
use axum::http::Response;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use std::sync::Arc;

pub const PROJECT_ID: &str = "academy-test";
pub const KEY_ID: &str = "test-key";
pub const ALICE_EMAIL: &str = "alice@academy.test";
pub const ALICE_PASSWORD: &str = "correctpw";

const TEST_KEY: &str = include_str!("../fixtures/test_rsa_key.pem");
const TEST_N: &str = "paL_S2tN18hE9brpkKA96X2CUr_eURLUkNmWaUd7FyXdbibfrmWQAXLm8FOlUp2oZgxPz8cMGGkAHtUno28tMXOlBwzcNmSwgMKz7oCRJwKDcQIc26jFmLxUd3S_yEse72qWKh8kGzuWw2jKdZqLqYyYbHGuYdm63cGRnDAZRBXGV6-BFGrdzjYB8gpSyrHFzU-Vz9nCC1N3j840YABl9KmjLmYSCTk89aY4mboLF1bzKw1yXPEaWkLFfH7rvRBjt7KlaenVFhqvSzRHTQ_jNrY3fA9ZE9EBuo-odyAE5rjHic4HutL0CvRneYHhAxu1-ID_59ZdpLlgY5HDPPwyDw";
const TEST_E: &str = "AQAB";

pub fn test_jwk() -> Jwk {
    Jwk {
        kty: "RSA".to_string(),
        kid: KEY_ID.to_string(),
        n: Some(TEST_N.to_string()),
        e: Some(TEST_E.to_string()),
        alg: Some("RS256".to_string()),
        key_use: Some("sig".to_string()),
    }
}

/// Mints a Firebase-shaped ID token signed with the fixture key.
pub fn mint_token(email: &str, role: Option<&str>, expires_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "sub": format!("uid-{}", email.split('@').next().unwrap_or(email)),
        "aud": PROJECT_ID,
        "iss": format!("https://securetoken.google.com/{PROJECT_ID}"),
        "iat": now - 60,
        "auth_time": now - 60,
        "exp": now + expires_in,
        "email": email,
    });
    if let Some(role) = role {
        claims["role"] = json!(role);
    }

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KEY_ID.to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(TEST_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.identity.project_id = PROJECT_ID.to_string();
    config.identity.api_key = "test-api-key".to_string();
    config.storage.database_path = "sqlite::memory:".to_string();
    config.session.store = SessionStoreKind::Memory;
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.observability.metrics_enabled = false;
    config
}

/// SQLite store holding alice (`alice@academy.test` / `correctpw`).
pub async fn seeded_store(config: &Config) -> Arc<dyn AdminStore> {
    let store: Arc<dyn AdminStore> = Arc::new(SqliteAdminStore::new(
        Store::new(&config.storage.database_path).await.unwrap(),
    ));

    let hash = password::hash_password_blocking(ALICE_PASSWORD.to_string(), config.security.clone())
        .await
        .unwrap();
    store
        .insert(NewAdmin {
            username: "alice".to_string(),
            email: Some(ALICE_EMAIL.to_string()),
            password_hash: Some(hash),
        })
        .await
        .unwrap();

    store
}

pub async fn spawn_state(config: Config) -> Arc<AppState> {
    let store = seeded_store(&config).await;
    state_with_store(config, store)
}

/// App state over `store`, verifying tokens against the fixture key.
pub fn state_with_store(config: Config, store: Arc<dyn AdminStore>) -> Arc<AppState> {
    let identity = Arc::new(
        FirebaseIdentityProvider::with_static_keys(&config.identity, vec![test_jwk()]).unwrap(),
    );
    let shared = Arc::new(SharedState::from_parts(config, store, identity));
    api::create_app_state(shared, None)
}

pub async fn spawn_app_with(config: Config) -> Router {
    api::router(spawn_state(config).await).await.unwrap()
}

pub async fn spawn_app() -> Router {
    spawn_app_with(test_config()).await
}

/// The `name=value` pair of the response's session cookie, if one was set.
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(ToString::to_string)
}
