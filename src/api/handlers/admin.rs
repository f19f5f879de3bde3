use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::protocol::SessionContext;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub sessions_deleted: usize,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "healthy".to_string(),
    })
}

pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let sessions_deleted = state.protocol.purge_sessions(&context)?;
    tracing::warn!(
        sessions = sessions_deleted,
        principal_id = %context.principal_id(),
        "Purged all sessions"
    );
    Ok(JSend::success(PurgeResponse { sessions_deleted }))
}
