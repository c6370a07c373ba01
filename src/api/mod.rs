use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{
    Expiry, ExpiredDeletion, MemoryStore, SessionManagerLayer, SessionStore, cookie::SameSite,
};
use tower_sessions_sqlx_store::{
    SqliteStore,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::config::{Config, SessionConfig, SessionStoreKind};
use crate::services::{AuthService, IdentityProvider};
use crate::state::SharedState;
use crate::storage::AdminStore;

mod admin;
pub mod auth;
mod error;
pub mod guard;
mod observability;
pub mod pages;
pub mod session;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn AdminStore> {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.shared.identity
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Opens the persistent session store and starts its expired-session sweep.
async fn sqlite_session_store(config: &SessionConfig) -> anyhow::Result<SqliteStore> {
    crate::db::ensure_sqlite_file(&config.database_path).await?;

    let options = SqliteConnectOptions::from_str(&config.database_path)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = SqliteStore::new(pool);
    store.migrate().await?;

    let interval = tokio::time::Duration::from_secs(config.cleanup_interval_seconds.max(1));
    let sweeper = store.clone();
    tokio::spawn(async move {
        if let Err(e) = sweeper.continuously_delete_expired(interval).await {
            tracing::error!("Expired session sweep stopped: {}", e);
        }
    });

    Ok(store)
}

pub async fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let session_config = state.config().session.clone();

    match session_config.store {
        SessionStoreKind::Memory => Ok(router_with_session_store(state, MemoryStore::default())),
        SessionStoreKind::Sqlite => {
            let store = sqlite_session_store(&session_config).await?;
            Ok(router_with_session_store(state, store))
        }
    }
}

/// Builds the router around an already opened session store.
pub fn router_with_session_store<S>(state: Arc<AppState>, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config();
    let lifetime = i64::try_from(config.session.lifetime_seconds).unwrap_or(i64::MAX);

    let session_layer = SessionManagerLayer::new(session_store)
        .with_name(config.session.cookie_name.clone())
        .with_secure(config.server.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(lifetime)));

    let cors_origins = &config.server.cors_allowed_origins;
    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let page_routes = Router::new()
        .route("/admin", get(admin::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_admin_page,
        ));

    let api_routes = Router::new()
        .route("/api/admin/me", get(admin::me))
        .route("/api/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_admin_api,
        ));

    Router::new()
        .route("/admin/login", get(auth::login_page).post(auth::login))
        .route("/admin/logout", get(auth::logout))
        .route("/sessionLogout", post(auth::session_logout))
        .route("/api/health", get(admin::health))
        .merge(page_routes)
        .merge(api_routes)
        .layer(session_layer)
        .with_state(state)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
}
