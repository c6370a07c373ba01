use std::sync::Arc;

use crate::clients::FirebaseIdentityProvider;
use crate::config::Config;
use crate::services::{AuthService, DefaultAuthService, IdentityProvider, LoginThrottle};
use crate::storage::{self, AdminStore};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Arc<dyn AdminStore>,

    pub identity: Arc<dyn IdentityProvider>,

    pub auth_service: Arc<dyn AuthService>,

    pub throttle: Arc<LoginThrottle>,
}

impl SharedState {
    /// Connects the configured admin store and identity provider.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = storage::connect(&config).await?;

        if config.storage.seed_default_admin {
            storage::ensure_default_admin(store.as_ref(), &config).await?;
        }

        if !config.token_login_configured() {
            tracing::warn!("identity.project_id is empty; token logins will be rejected");
        }
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(FirebaseIdentityProvider::new(&config.identity)?);

        Ok(Self::from_parts(config, store, identity))
    }

    /// Assembles the state from already constructed collaborators.
    #[must_use]
    pub fn from_parts(
        config: Config,
        store: Arc<dyn AdminStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let throttle = Arc::new(LoginThrottle::new(
            config.security.auth_throttle.clone(),
        ));
        let auth_service: Arc<dyn AuthService> = Arc::new(DefaultAuthService::new(
            &config,
            store.clone(),
            identity.clone(),
            throttle.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            identity,
            auth_service,
            throttle,
        }
    }
}
