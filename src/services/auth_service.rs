//! Domain service for admin authentication.
//!
//! Turns presented credentials (identity token, legacy username/password, or a
//! per-request bearer token) into the [`SessionAdmin`] the guard works with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::identity::IdentityError;
use crate::storage::{AdminRecord, StorageError};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No credentials supplied")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not authorized to administer this academy")]
    NotAuthorized,

    #[error("Too many failed attempts; retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl AuthError {
    /// Stable machine-readable kind, used in API error bodies and metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::NotAuthorized => "not_authorized",
            Self::TooManyAttempts { .. } => "too_many_attempts",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken(_) => Self::InvalidToken,
            IdentityError::InvalidCredentials(_) => Self::InvalidCredentials,
        }
    }
}

/// The authenticated admin a session (or a bearer request) is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAdmin {
    /// `AdminRecord` id, or the identity uid under the claim policy.
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Unix seconds of the login that produced this session.
    pub issued_at: i64,
}

impl SessionAdmin {
    #[must_use]
    pub fn from_record(record: &AdminRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.username.clone(),
            email: record.email.clone(),
            issued_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Credentials of a login request, after precedence has been applied.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginCredentials {
    IdToken(String),
    Password { username: String, password: String },
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdToken(_) => f.write_str("IdToken(..)"),
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl LoginCredentials {
    /// Picks the login path. A non-empty token wins over username/password.
    pub fn from_parts(
        id_token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, AuthError> {
        if let Some(token) = id_token.filter(|t| !t.trim().is_empty()) {
            return Ok(Self::IdToken(token.trim().to_string()));
        }

        match (username, password) {
            (Some(username), Some(password))
                if !username.trim().is_empty() && !password.is_empty() =>
            {
                Ok(Self::Password {
                    username: username.trim().to_string(),
                    password,
                })
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }

    /// Label for the `method` metric dimension.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::IdToken(_) => "token",
            Self::Password { .. } => "password",
        }
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies an identity token and applies the role policy.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidToken`] when verification fails,
    /// [`AuthError::NotAuthorized`] when the identity is not an admin.
    async fn login_with_token(&self, id_token: &str) -> Result<SessionAdmin, AuthError>;

    /// Checks a username/password pair against the local admin records.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] on unknown user or wrong password,
    /// [`AuthError::TooManyAttempts`] while the username is locked out.
    async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionAdmin, AuthError>;

    /// Resolves a per-request bearer token. Nothing is persisted.
    async fn authenticate_bearer(&self, token: &str) -> Result<SessionAdmin, AuthError>;

    async fn login(&self, credentials: &LoginCredentials) -> Result<SessionAdmin, AuthError> {
        match credentials {
            LoginCredentials::IdToken(token) => self.login_with_token(token).await,
            LoginCredentials::Password { username, password } => {
                self.login_with_password(username, password).await
            }
        }
    }
}
