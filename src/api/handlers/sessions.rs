use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::protocol::{SessionContext, SessionSummary};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// The caller's live sessions, newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
) -> Result<Json<JSend<SessionListResponse>>, ApiError> {
    let sessions = state.protocol.sessions(context.principal_id())?;
    Ok(JSend::success(SessionListResponse { sessions }))
}

/// Revoke one of the caller's sessions. Other principals' sessions are not found.
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.protocol.revoke_session(context.principal_id(), &id)?;
    tracing::debug!(session_id = %id, principal_id = %context.principal_id(), "Revoked session");
    Ok(JSend::success(()))
}
