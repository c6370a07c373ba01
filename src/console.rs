//! Console client: the browser side of the admin sign-in flow.
//!
//! Signs in at the identity provider, exchanges the ID token for a server
//! session, and discards its identity state whenever the server says the
//! identity is not an administrator.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::services::{IdentityError, IdentityProvider, SessionAdmin, SignedIn};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Sign-in failed: {0}")]
    InvalidCredentials(String),

    #[error("This account is not an administrator")]
    NotAuthorized,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Server answered {status}: {message}")]
    Server { status: StatusCode, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<String>,
}

pub struct ConsoleClient {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
    signed_in: Mutex<Option<SignedIn>>,
}

impl ConsoleClient {
    pub fn new(base_url: &str, identity: Arc<dyn IdentityProvider>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("academy-admin-console/1.0")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
            signed_in: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn is_signed_in(&self) -> bool {
        self.signed_in.lock().await.is_some()
    }

    /// Signs in at the identity provider, then opens a server session.
    ///
    /// The identity is kept only once the server has accepted it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionAdmin, ConsoleError> {
        self.signed_in.lock().await.take();

        let signed_in = self
            .identity
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| match e {
                IdentityError::InvalidCredentials(msg) | IdentityError::InvalidToken(msg) => {
                    ConsoleError::InvalidCredentials(msg)
                }
            })?;

        let response = self
            .http
            .post(self.url("/admin/login"))
            .json(&json!({ "idToken": signed_in.id_token }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            tracing::warn!("Server refused the identity; signing out");
            if let Err(e) = self.sign_out().await {
                tracing::warn!(error = %e, "Sign-out after refusal failed");
            }
            return Err(ConsoleError::NotAuthorized);
        }

        let envelope: Envelope<SessionAdmin> = response.json().await?;
        match (status.is_success(), envelope.data) {
            (true, Some(admin)) => {
                *self.signed_in.lock().await = Some(signed_in);
                Ok(admin)
            }
            _ => Err(ConsoleError::Server {
                status,
                message: envelope.error.unwrap_or_default(),
            }),
        }
    }

    /// Drops the identity state and ends the server session.
    pub async fn sign_out(&self) -> Result<(), ConsoleError> {
        self.signed_in.lock().await.take();

        let response = self.http.post(self.url("/sessionLogout")).send().await?;
        if !response.status().is_success() {
            return Err(ConsoleError::Server {
                status: response.status(),
                message: "sign-out failed".to_string(),
            });
        }
        Ok(())
    }

    /// The session holder as the server sees it.
    pub async fn current_admin(&self) -> Result<SessionAdmin, ConsoleError> {
        let response = self.http.get(self.url("/api/admin/me")).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConsoleError::NotSignedIn);
        }
        if status == StatusCode::FORBIDDEN {
            return Err(ConsoleError::NotAuthorized);
        }

        let envelope: Envelope<SessionAdmin> = response.json().await?;
        envelope.data.ok_or_else(|| ConsoleError::Server {
            status,
            message: envelope.error.unwrap_or_default(),
        })
    }
}
