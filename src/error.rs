//! Caller-facing error taxonomy.
//!
//! Lower layers keep their own error enums; the session protocol converts
//! them into [`AuthError`], which is the only error the HTTP boundary sees.

use axum::http::StatusCode;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::storage::StoreError;
use crate::tokens::issuer::TokenError;
use crate::tokens::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    NotFound(String),
    #[error("Session was already refreshed elsewhere, log in again")]
    RotationConflict,
    #[error("Session store unavailable")]
    StoreUnavailable(String),
    #[error("Token expired")]
    TokenExpired,
    #[error("Token invalid")]
    TokenInvalid,
}

impl AuthError {
    /// Stable snake_case name reported to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::BadRequest(_) => "bad_request",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::Internal(_) => "internal",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::NotFound(_) => "not_found",
            AuthError::RotationConflict => "rotation_conflict",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InvalidCredentials
            | AuthError::RotationConflict
            | AuthError::TokenExpired
            | AuthError::TokenInvalid => StatusCode::UNAUTHORIZED,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AuthError::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthError::BadRequest(message.into())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateIdentifier => {
                AuthError::BadRequest("Identifier is already registered".to_string())
            }
            StoreError::DuplicateToken => AuthError::Internal(e.to_string()),
            StoreError::Database(inner) => {
                tracing::error!(error = %inner, "Store failure");
                AuthError::StoreUnavailable(inner.to_string())
            }
        }
    }
}

impl From<CredentialError> for AuthError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::InvalidCredentials => AuthError::InvalidCredentials,
            CredentialError::MissingIdentifier => AuthError::BadRequest(e.to_string()),
            CredentialError::Hashing(msg) => AuthError::Internal(msg),
            CredentialError::Store(inner) => inner.into(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid(_) => AuthError::TokenInvalid,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<LedgerError> for AuthError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DuplicateToken => AuthError::Internal(e.to_string()),
            LedgerError::InvalidToken => AuthError::TokenInvalid,
            LedgerError::Store(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseError;

    #[test]
    fn test_token_failures_map_to_distinct_kinds() {
        let expired = AuthError::from(TokenError::Expired);
        let invalid = AuthError::from(TokenError::Invalid("bad signature".to_string()));
        assert_eq!(expired.kind(), "token_expired");
        assert_eq!(invalid.kind(), "token_invalid");
        assert_eq!(expired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_failure_is_not_an_auth_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = AuthError::from(LedgerError::Store(StoreError::Database(DatabaseError::Io(io))));
        assert_eq!(err.kind(), "store_unavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_credential_errors() {
        assert_eq!(
            AuthError::from(CredentialError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::from(CredentialError::MissingIdentifier).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::forbidden("nope").status_code(), StatusCode::FORBIDDEN);
    }
}
