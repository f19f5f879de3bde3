//! Request extractors shared by the handlers.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::response::ApiError;
use crate::device::client_metadata;
use crate::error::AuthError;
use crate::protocol::SessionContext;
use crate::storage::models::ClientMetadata;
use crate::AppState;

/// Caller identity from an `Authorization: Bearer <access token>` header.
///
/// Rejects with `token_expired` or `token_invalid` so clients know whether
/// a refresh can help.
impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::TokenInvalid)?;
        Ok(state.protocol.authenticate(token)?)
    }
}

/// Client details recorded on the session: User-Agent and peer address.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub metadata: Option<ClientMetadata>,
    /// True for browsers navigating directly, which get redirects instead of JSON
    pub interactive: bool,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok());
        let ip = forwarded_for(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });

        let metadata = match (user_agent, ip) {
            (None, None) => None,
            (user_agent, ip) => Some(client_metadata(user_agent, ip)),
        };

        Ok(ClientInfo {
            metadata,
            interactive: is_interactive(&parts.headers),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|t| !t.is_empty())
}

// First hop of X-Forwarded-For, when behind a proxy
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

fn is_interactive(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("BEARER  "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7, 10.0.0.1"));
        assert_eq!(forwarded_for(&headers), Some("198.51.100.7".parse().unwrap()));
    }

    #[test]
    fn test_interactive_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_interactive(&headers));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert!(is_interactive(&headers));
    }
}
