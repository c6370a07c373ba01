//! Guards for protected routes.
//!
//! A request is admitted by a live session, or by an `Authorization: Bearer`
//! identity token that passes verification and the role check on this very
//! request. Bearer requests never create a session.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::observability::RequestSpan;
use super::{ApiError, AppState, session};
use crate::services::{AuthError, SessionAdmin};

/// Extract the bearer token from the Authorization header
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        let token = token.trim();
        return (!token.is_empty()).then(|| token.to_string());
    }

    None
}

/// `Ok(None)` when the request carries neither a session nor a bearer token.
async fn resolve_admin(
    state: &AppState,
    session: &Session,
    headers: &HeaderMap,
) -> Result<Option<SessionAdmin>, AuthError> {
    let bearer = extract_bearer(headers);

    match session::current(session, state.config().session.lifetime_seconds).await {
        Ok(Some(admin)) => return Ok(Some(admin)),
        Ok(None) => {}
        Err(err) if bearer.is_some() => {
            tracing::warn!(error = %err, "Session lookup failed; trying the bearer token");
        }
        Err(err) => return Err(err),
    }

    match bearer {
        Some(token) => state
            .auth_service()
            .authenticate_bearer(&token)
            .await
            .map(Some),
        None => Ok(None),
    }
}

fn admit(admin: SessionAdmin, mut request: Request) -> Request {
    if let Some(RequestSpan(span)) = request.extensions().get::<RequestSpan>() {
        span.record("admin_id", admin.id.as_str());
    }
    request.extensions_mut().insert(admin);
    request
}

/// Guard for JSON routes: `401`/`403`/`500` with an error body.
pub async fn require_admin_api(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    match resolve_admin(&state, &session, &headers).await {
        Ok(Some(admin)) => next.run(admit(admin, request)).await,
        Ok(None) => ApiError::Unauthorized("Authentication required".to_string()).into_response(),
        Err(err) => ApiError::Auth(err).into_response(),
    }
}

/// Guard for browser pages: redirects to the login page instead.
pub async fn require_admin_page(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    match resolve_admin(&state, &session, &headers).await {
        Ok(Some(admin)) => next.run(admit(admin, request)).await,
        Err(err @ AuthError::StorageUnavailable(_)) => ApiError::Auth(err).into_response(),
        Ok(None) | Err(_) => Redirect::to("/admin/login").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_is_extracted_and_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer  abc.def "));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc.def"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn admitted_admin_is_recorded_on_request_span() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", admin_id = tracing::field::Empty);
            let mut request = Request::new(axum::body::Body::empty());
            request.extensions_mut().insert(RequestSpan(span.clone()));

            // An inner span is current, as under TraceLayer.
            let inner = tracing::info_span!(parent: &span, "http");
            let _entered = inner.enter();

            let admin = SessionAdmin {
                id: "42".to_string(),
                username: "alice".to_string(),
                email: None,
                issued_at: 0,
            };
            let request = admit(admin, request);
            assert!(request.extensions().get::<SessionAdmin>().is_some());
            tracing::info!("handled");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("admin_id=\"42\"") || output.contains("admin_id=42"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_bearer(&headers), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
