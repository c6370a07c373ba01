use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::AuthError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),

    ValidationError(String),

    Unauthorized(String),

    ServiceUnavailable(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Status and client-facing message for an authentication failure.
///
/// Storage failures are logged here and never leak their cause.
pub fn auth_failure(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::MissingCredentials => (
            StatusCode::BAD_REQUEST,
            "Provide an idToken or a username and password".to_string(),
        ),
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ),
        AuthError::InvalidToken => (
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token".to_string(),
        ),
        AuthError::NotAuthorized => (
            StatusCode::FORBIDDEN,
            "This account is not an administrator".to_string(),
        ),
        AuthError::TooManyAttempts { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many failed attempts. Try again in {retry_after_secs} seconds"),
        ),
        AuthError::StorageUnavailable(msg) => {
            tracing::error!("Storage error during authentication: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "A storage error occurred".to_string(),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Auth(err) => {
                let (status, message) = auth_failure(err);
                let body = ApiResponse::<()>::error(message)
                    .with_code(err.code())
                    .with_sign_out(matches!(err, AuthError::NotAuthorized));
                (status, body)
            }
            Self::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error(msg.clone()).with_code("validation"),
            ),
            Self::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ApiResponse::error(msg.clone()).with_code("unauthenticated"),
            ),
            Self::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiResponse::error("Service unavailable").with_code("unavailable"),
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("An internal error occurred").with_code("internal"),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::Auth(AuthError::TooManyAttempts { retry_after_secs }) = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
