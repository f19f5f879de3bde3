use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::error::AuthError;
use crate::protocol::{NewPrincipal, PrincipalSummary, SessionContext};
use crate::AppState;

pub async fn create_principal(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
    AppJson(request): AppJson<NewPrincipal>,
) -> Result<(StatusCode, Json<JSend<PrincipalSummary>>), ApiError> {
    let worker = Arc::clone(&state);
    let created = tokio::task::spawn_blocking(move || {
        worker.protocol.create_principal(&context, request)
    })
    .await
    .map_err(|e| AuthError::Internal(format!("Create principal task failed: {e}")))??;

    Ok((StatusCode::CREATED, JSend::success(created)))
}
