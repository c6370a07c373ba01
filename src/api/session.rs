//! Server-side admin sessions.

use tower_sessions::Session;

use crate::services::{AuthError, SessionAdmin};

pub const SESSION_ADMIN_KEY: &str = "admin";

fn storage_error(err: &tower_sessions::session::Error) -> AuthError {
    AuthError::StorageUnavailable(format!("session store: {err}"))
}

/// Binds `admin` to the session under a fresh session id.
pub async fn establish(session: &Session, admin: &SessionAdmin) -> Result<(), AuthError> {
    session.cycle_id().await.map_err(|e| storage_error(&e))?;
    session
        .insert(SESSION_ADMIN_KEY, admin)
        .await
        .map_err(|e| storage_error(&e))
}

/// The session holder, unless the session is absent or older than `lifetime_seconds`.
///
/// Expired sessions are flushed.
pub async fn current(
    session: &Session,
    lifetime_seconds: u64,
) -> Result<Option<SessionAdmin>, AuthError> {
    let Some(admin) = session
        .get::<SessionAdmin>(SESSION_ADMIN_KEY)
        .await
        .map_err(|e| storage_error(&e))?
    else {
        return Ok(None);
    };

    let lifetime = i64::try_from(lifetime_seconds).unwrap_or(i64::MAX);
    let now = chrono::Utc::now().timestamp();
    if now.saturating_sub(admin.issued_at) >= lifetime {
        tracing::debug!(admin_id = %admin.id, "Session past its lifetime");
        destroy(session).await;
        return Ok(None);
    }

    Ok(Some(admin))
}

/// Deletes the session. Missing sessions are fine.
pub async fn destroy(session: &Session) {
    if let Err(e) = session.flush().await {
        tracing::warn!(error = %e, "Failed to delete session");
    }
}
