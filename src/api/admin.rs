use axum::{
    Extension, Json,
    extract::State,
    response::Html,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, HealthResponse, pages};
use crate::services::SessionAdmin;

/// GET /admin
pub async fn dashboard(Extension(admin): Extension<SessionAdmin>) -> Html<String> {
    Html(pages::dashboard(&admin))
}

/// GET /api/admin/me
pub async fn me(Extension(admin): Extension<SessionAdmin>) -> Json<ApiResponse<SessionAdmin>> {
    Json(ApiResponse::success(admin))
}

/// GET /api/health
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    state
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    Ok(Json(ApiResponse::success(HealthResponse {
        status: "ok",
        backend: state.store().backend().to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })))
}
