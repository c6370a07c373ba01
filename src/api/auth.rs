use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, error::auth_failure, pages, session};
use crate::services::{AuthError, LoginCredentials, SessionAdmin};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginPayload {
    #[serde(default, rename = "idToken", alias = "id_token")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// How the login outcome is reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Form post from the login page: redirects and re-rendered pages.
    Browser,
    /// JSON request: status codes and JSON bodies.
    Api,
}

/// A login request body, JSON or form-encoded.
pub struct LoginSubmission {
    pub mode: ResponseMode,
    pub payload: LoginPayload,
}

impl<S> FromRequest<S> for LoginSubmission
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(payload) = Form::<LoginPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            return Ok(Self {
                mode: ResponseMode::Browser,
                payload,
            });
        }

        if content_type.starts_with("application/json") {
            let Json(payload) = Json::<LoginPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            return Ok(Self {
                mode: ResponseMode::Api,
                payload,
            });
        }

        Ok(Self {
            mode: ResponseMode::Api,
            payload: LoginPayload::default(),
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /admin/login
pub async fn login_page(State(state): State<Arc<AppState>>, session: Session) -> Response {
    if let Ok(Some(_)) = session::current(&session, state.config().session.lifetime_seconds).await {
        return Redirect::to("/admin").into_response();
    }
    Html(pages::login_page(None)).into_response()
}

/// POST /admin/login
/// Token login (`idToken`) or legacy username/password login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    submission: LoginSubmission,
) -> Response {
    let LoginPayload {
        id_token,
        username,
        password,
    } = submission.payload;

    let mut method = "none";
    let result = async {
        let credentials = LoginCredentials::from_parts(id_token, username, password)?;
        method = credentials.method();

        let admin = state.auth_service().login(&credentials).await?;
        session::establish(&session, &admin).await?;
        Ok::<SessionAdmin, AuthError>(admin)
    }
    .await;

    let outcome = result.as_ref().map_or_else(AuthError::code, |_| "success");
    metrics::counter!("auth_login_total", "method" => method, "outcome" => outcome).increment(1);

    match result {
        Ok(admin) => {
            tracing::info!(admin_id = %admin.id, method, "Admin signed in");
            match submission.mode {
                ResponseMode::Browser => Redirect::to("/admin").into_response(),
                ResponseMode::Api => Json(ApiResponse::success(admin)).into_response(),
            }
        }
        Err(err) => {
            if matches!(err, AuthError::NotAuthorized) {
                session::destroy(&session).await;
            }
            tracing::info!(method, outcome, "Login rejected");

            match submission.mode {
                ResponseMode::Browser => {
                    let (status, message) = auth_failure(&err);
                    (status, Html(pages::login_page(Some(&message)))).into_response()
                }
                ResponseMode::Api => ApiError::Auth(err).into_response(),
            }
        }
    }
}

/// GET /admin/logout
pub async fn logout(session: Session) -> Redirect {
    session::destroy(&session).await;
    Redirect::to("/admin/login")
}

/// POST /sessionLogout
pub async fn session_logout(session: Session) -> Json<ApiResponse<MessageResponse>> {
    session::destroy(&session).await;
    Json(ApiResponse::success(MessageResponse {
        message: "Signed out".to_string(),
    }))
}
