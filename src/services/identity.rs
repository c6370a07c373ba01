//! Identity-provider seam.
//!
//! The provider owns identities; this service only verifies the tokens it
//! issues and, for the console client, performs password sign-in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Malformed, expired, wrongly signed or otherwise unverifiable token.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Wrong password, unknown or disabled account.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// A principal asserted by the identity provider.
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Every claim of the token that is not a registered JWT claim.
    pub claims: Map<String, Value>,
}

impl Identity {
    #[must_use]
    pub fn claim_str(&self, key: &str) -> Option<&str> {
        self.claims.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.claim_str("role")
    }
}

/// Result of a password sign-in at the provider.
#[derive(Clone)]
pub struct SignedIn {
    pub uid: String,
    pub email: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: u64,
}

impl std::fmt::Debug for SignedIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIn")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies signature, expiry, audience and issuer of an ID token.
    async fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError>;

    /// Exchanges an email/password pair for an ID token.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, IdentityError>;
}
