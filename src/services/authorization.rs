//! Role check applied to verified identities.

use tracing::{debug, error};

use crate::config::{AuthorizationConfig, RolePolicyKind};
use crate::services::auth_service::{AuthError, SessionAdmin};
use crate::services::identity::Identity;
use crate::storage::AdminStore;

#[derive(Debug, Clone)]
pub struct RolePolicy {
    kind: RolePolicyKind,
    admin_role: String,
}

impl RolePolicy {
    #[must_use]
    pub fn new(kind: RolePolicyKind, admin_role: impl Into<String>) -> Self {
        Self {
            kind,
            admin_role: admin_role.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self::new(config.policy, config.admin_role.clone())
    }

    #[must_use]
    pub const fn kind(&self) -> RolePolicyKind {
        self.kind
    }

    /// Decides whether `identity` may administer the academy.
    ///
    /// Under the claim policy the store is not consulted and the session is
    /// bound to the identity's uid.
    pub async fn authorize(
        &self,
        identity: &Identity,
        store: &dyn AdminStore,
    ) -> Result<SessionAdmin, AuthError> {
        match self.kind {
            RolePolicyKind::Claim => {
                if identity.role() != Some(self.admin_role.as_str()) {
                    debug!(uid = %identity.uid, "Identity lacks the admin role claim");
                    return Err(AuthError::NotAuthorized);
                }

                Ok(SessionAdmin {
                    id: identity.uid.clone(),
                    username: identity
                        .email
                        .clone()
                        .unwrap_or_else(|| identity.uid.clone()),
                    email: identity.email.clone(),
                    issued_at: chrono::Utc::now().timestamp(),
                })
            }
            RolePolicyKind::AllowList => {
                let Some(email) = identity.email.as_deref().filter(|e| !e.is_empty()) else {
                    debug!(uid = %identity.uid, "Identity has no email to match");
                    return Err(AuthError::NotAuthorized);
                };

                let record = store.find_by_email(email).await.map_err(|e| {
                    error!(error = %e, "Admin lookup failed");
                    AuthError::from(e)
                })?;

                record.as_ref().map(SessionAdmin::from_record).ok_or_else(|| {
                    debug!(uid = %identity.uid, "No admin record for identity");
                    AuthError::NotAuthorized
                })
            }
        }
    }
}
