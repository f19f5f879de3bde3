use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Session lifecycle
    let auth_routes = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/logout-all", post(handlers::logout_all))
        .route("/auth/me", get(handlers::me))
        .route("/auth/refresh", post(handlers::refresh));

    // Bearer-authenticated resources
    let mut api_routes = Router::new()
        .route("/principals", post(handlers::create_principal))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}", delete(handlers::revoke_session));

    // Test-only routes -- dangerous operations gated behind TEST_MODE
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        api_routes = api_routes.route("/admin/purge", delete(handlers::admin_purge));
    }

    let internal_routes = Router::new().route("/_internal/health", get(handlers::health));

    Router::new()
        .merge(auth_routes)
        .merge(api_routes)
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
