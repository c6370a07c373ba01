//! Default implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::config::SecurityConfig;
use crate::services::auth_service::{AuthError, AuthService, SessionAdmin};
use crate::services::authorization::RolePolicy;
use crate::services::identity::IdentityProvider;
use crate::services::password;
use crate::services::throttle::LoginThrottle;
use crate::storage::{AdminRecord, AdminStore};

pub struct DefaultAuthService {
    store: Arc<dyn AdminStore>,
    identity: Arc<dyn IdentityProvider>,
    policy: RolePolicy,
    throttle: Arc<LoginThrottle>,
    security: SecurityConfig,
    legacy_login_enabled: bool,
    /// Hash checked against when the username is unknown, so misses cost as much as hits.
    decoy_hash: OnceCell<String>,
}

impl DefaultAuthService {
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<dyn AdminStore>,
        identity: Arc<dyn IdentityProvider>,
        throttle: Arc<LoginThrottle>,
    ) -> Self {
        Self {
            store,
            identity,
            policy: RolePolicy::from_config(&config.authorization),
            throttle,
            security: config.security.clone(),
            legacy_login_enabled: config.authorization.legacy_login_enabled,
            decoy_hash: OnceCell::new(),
        }
    }

    async fn resolve_token(&self, token: &str) -> Result<SessionAdmin, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let identity = self.identity.verify_id_token(token).await?;
        self.policy.authorize(&identity, self.store.as_ref()).await
    }

    async fn verify_against_decoy(&self, password: &str) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| {
                password::hash_password_blocking(
                    "academy-admin-decoy".to_string(),
                    self.security.clone(),
                )
            })
            .await;

        match decoy {
            Ok(hash) => {
                let _ = password::verify_password(password, hash).await;
            }
            Err(e) => warn!(error = %e, "Failed to prepare decoy password hash"),
        }
    }

    /// Replaces a bcrypt hash with Argon2id. Failures are logged only.
    async fn upgrade_hash(&self, admin: &AdminRecord, password: &str) {
        let new_hash =
            match password::hash_password_blocking(password.to_string(), self.security.clone())
                .await
            {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(error = %e, admin_id = %admin.id, "Password rehash failed");
                    return;
                }
            };

        match self.store.update_password_hash(&admin.id, &new_hash).await {
            Ok(()) => info!(admin_id = %admin.id, "Migrated legacy password hash to Argon2id"),
            Err(e) => warn!(error = %e, admin_id = %admin.id, "Storing rehashed password failed"),
        }
    }
}

#[async_trait]
impl AuthService for DefaultAuthService {
    async fn login_with_token(&self, id_token: &str) -> Result<SessionAdmin, AuthError> {
        self.resolve_token(id_token).await
    }

    async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionAdmin, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !self.legacy_login_enabled {
            debug!("Username/password login is disabled");
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(retry_after) = self.throttle.check(username).await {
            return Err(AuthError::TooManyAttempts {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        let Some(admin) = self.store.find_by_username(username).await? else {
            self.verify_against_decoy(password).await;
            self.throttle.record_failure(username).await;
            return Err(AuthError::InvalidCredentials);
        };

        let Some(hash) = admin.password_hash.as_deref() else {
            error!(admin_id = %admin.id, "Admin record has no password hash");
            return Err(AuthError::StorageUnavailable(
                "admin record has no password hash".to_string(),
            ));
        };

        let is_valid = password::verify_password(password, hash).await.map_err(|e| {
            error!(error = %e, admin_id = %admin.id, "Stored password hash is unusable");
            AuthError::StorageUnavailable(e.to_string())
        })?;

        if !is_valid {
            self.throttle.record_failure(username).await;
            return Err(AuthError::InvalidCredentials);
        }

        self.throttle.record_success(username).await;

        if self.security.auto_migrate_password_hashes && password::is_legacy_hash(hash) {
            self.upgrade_hash(&admin, password).await;
        }

        Ok(SessionAdmin::from_record(&admin))
    }

    async fn authenticate_bearer(&self, token: &str) -> Result<SessionAdmin, AuthError> {
        self.resolve_token(token).await
    }
}
