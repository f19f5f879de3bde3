use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::cookies::{clear_refresh_cookie, refresh_cookie, refresh_token_from};
use crate::api::middleware::ClientInfo;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::config::Config;
use crate::error::AuthError;
use crate::protocol::{LoginRequest, PrincipalSummary, SessionContext, TokenPair};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

/// Optional body for refresh and logout when the cookie is not available
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenBody {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    AppJson(mut request): AppJson<LoginRequest>,
) -> Response {
    request.metadata = client.metadata.unwrap_or_default();

    // Argon2 is CPU-bound; keep it off the async workers
    let worker = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || worker.protocol.login(request))
        .await
        .unwrap_or_else(|e| Err(AuthError::Internal(format!("Login task failed: {e}"))));

    match result {
        Ok(pair) => issue(&state.config, jar, pair),
        Err(e) => reject(&state.config, client.interactive, jar, e, false),
    }
}

/// Rotate the presented refresh token. Every rejection clears the cookie.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let token = match presented_token(&state.config, &jar, &body) {
        Ok(Some(token)) => token,
        Ok(None) => {
            return reject(&state.config, client.interactive, jar, AuthError::TokenInvalid, true)
        }
        Err(e) => return reject(&state.config, client.interactive, jar, e, true),
    };

    match state.protocol.refresh(&token, client.metadata) {
        Ok(pair) => issue(&state.config, jar, pair),
        Err(e) => reject(&state.config, client.interactive, jar, e, true),
    }
}

/// Revoke the presented session. Succeeds whether or not it was still live.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar, body: Bytes) -> Response {
    let cleared = jar.clone().add(clear_refresh_cookie(&state.config.cookies));

    let revoked = match presented_token(&state.config, &jar, &body) {
        Ok(Some(token)) => state.protocol.logout(&token),
        Ok(None) => Ok(0),
        Err(e) => Err(e),
    };

    match revoked {
        Ok(revoked) => {
            tracing::debug!(revoked, "Logout");
            (cleared, JSend::success(RevokedResponse { revoked })).into_response()
        }
        Err(e) => (cleared, ApiError::from(e)).into_response(),
    }
}

/// Revoke every session of the caller
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
    jar: CookieJar,
) -> Result<(CookieJar, Json<JSend<RevokedResponse>>), ApiError> {
    let revoked = state.protocol.logout_all(context.principal_id())?;
    tracing::info!(principal_id = %context.principal_id(), revoked, "Logged out everywhere");

    Ok((
        jar.add(clear_refresh_cookie(&state.config.cookies)),
        JSend::success(RevokedResponse { revoked }),
    ))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    context: SessionContext,
) -> Result<Json<JSend<PrincipalSummary>>, ApiError> {
    Ok(JSend::success(state.protocol.me(&context)?))
}

// ============================================================================
// Helpers
// ============================================================================

fn issue(config: &Config, jar: CookieJar, pair: TokenPair) -> Response {
    let cookie = refresh_cookie(
        &config.cookies,
        &pair.refresh_token,
        config.tokens.refresh_ttl_seconds,
    );
    (jar.add(cookie), JSend::success(pair)).into_response()
}

/// Failure response for login and refresh.
///
/// Interactive clients are sent back to the login page on client errors;
/// API clients get a JSend body carrying the error kind.
fn reject(
    config: &Config,
    interactive: bool,
    jar: CookieJar,
    error: AuthError,
    clear_cookie: bool,
) -> Response {
    let jar = if clear_cookie {
        jar.add(clear_refresh_cookie(&config.cookies))
    } else {
        jar
    };

    if interactive && error.status_code().is_client_error() {
        return (jar, Redirect::to(&config.cookies.login_path)).into_response();
    }

    (jar, ApiError::from(error)).into_response()
}

/// Refresh token from the cookie, else from a JSON body
fn presented_token(
    config: &Config,
    jar: &CookieJar,
    body: &Bytes,
) -> Result<Option<String>, AuthError> {
    if let Some(token) = refresh_token_from(jar, &config.cookies) {
        return Ok(Some(token));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let parsed: RefreshTokenBody = serde_json::from_slice(body)
        .map_err(|e| AuthError::bad_request(format!("Invalid JSON body: {e}")))?;
    Ok(parsed
        .refresh_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;
    use axum::http::StatusCode;
    use axum_extra::extract::cookie::Cookie;

    #[test]
    fn test_cookie_wins_over_body() {
        let config = test_config();
        let jar = CookieJar::new().add(Cookie::new("refresh_token", "from-cookie"));
        let body = Bytes::from_static(br#"{"refresh_token":"from-body"}"#);
        assert_eq!(
            presented_token(&config, &jar, &body).unwrap().as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_body_token_and_empty_body() {
        let config = test_config();
        let jar = CookieJar::new();
        let body = Bytes::from_static(br#"{"refresh_token":"from-body"}"#);
        assert_eq!(
            presented_token(&config, &jar, &body).unwrap().as_deref(),
            Some("from-body")
        );
        assert_eq!(presented_token(&config, &jar, &Bytes::new()).unwrap(), None);
        assert!(presented_token(&config, &jar, &Bytes::from_static(b"{not json")).is_err());
    }

    #[test]
    fn test_interactive_rejection_redirects_and_clears_cookie() {
        let config = test_config();
        let response = reject(&config, true, CookieJar::new(), AuthError::TokenInvalid, true);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");

        let set_cookie = response.headers()["set-cookie"].to_str().unwrap();
        assert!(set_cookie.starts_with("refresh_token="));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_api_rejection_keeps_status() {
        let config = test_config();
        let response = reject(&config, false, CookieJar::new(), AuthError::RotationConflict, false);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("set-cookie").is_none());
    }
}
