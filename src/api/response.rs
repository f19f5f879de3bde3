use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// ============================================================================
// JSend status enum
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

// ============================================================================
// JSend success envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

// ============================================================================
// JSend fail envelope (client errors, 4xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    /// Error taxonomy name, e.g. `token_expired`
    pub kind: String,
    pub message: String,
}

impl JSendFail {
    pub fn response(
        status_code: StatusCode,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendFail>) {
        (
            status_code,
            Json(JSendFail {
                data: FailData {
                    kind: kind.into(),
                    message: message.into(),
                },
                status: JSendStatus::Fail,
            }),
        )
    }
}

// ============================================================================
// JSend error envelope (server errors, 5xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub kind: String,
    pub message: String,
    pub status: JSendStatus,
}

impl JSendError {
    pub fn response(
        status_code: StatusCode,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendError>) {
        (
            status_code,
            Json(JSendError {
                kind: kind.into(),
                message: message.into(),
                status: JSendStatus::Error,
            }),
        )
    }
}

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A JSend-compatible error that can be either a fail (4xx) or error (5xx).
/// Used as the error type in handler Result returns.
#[derive(Debug)]
pub enum ApiError {
    Error(StatusCode, &'static str, String),
    Fail(StatusCode, &'static str, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, kind, msg) => JSendFail::response(code, kind, msg).into_response(),
            ApiError::Error(code, kind, msg) => {
                JSendError::response(code, kind, msg).into_response()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = e.status_code();
        let kind = e.kind();
        if status.is_client_error() {
            ApiError::Fail(status, kind, e.to_string())
        } else {
            // Store and internal details stay in the logs
            tracing::error!(error = ?e, "Request failed");
            let message = match e {
                AuthError::StoreUnavailable(_) => "Session store unavailable",
                _ => "Internal server error",
            };
            ApiError::Error(status, kind, message.to_string())
        }
    }
}

// ============================================================================
// JSON body extractor with JSend rejections
// ============================================================================

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Fail(rejection.status(), "bad_request", rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_become_fail_envelopes() {
        match ApiError::from(AuthError::TokenExpired) {
            ApiError::Fail(code, kind, _) => {
                assert_eq!(code, StatusCode::UNAUTHORIZED);
                assert_eq!(kind, "token_expired");
            }
            other => panic!("expected fail envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_store_details_are_not_leaked() {
        let err = ApiError::from(AuthError::StoreUnavailable("/var/data: permission denied".into()));
        match err {
            ApiError::Error(code, kind, message) => {
                assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(kind, "store_unavailable");
                assert!(!message.contains("/var/data"));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
    }
}
