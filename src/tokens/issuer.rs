//! Signed access and refresh tokens.
//!
//! Each token class has its own HMAC secret and `kid`; a token minted with
//! one class never verifies as the other. Expiry is judged against the
//! injected [`Clock`] so callers can tell `Expired` (recover by refreshing
//! or logging in again) from `Invalid` (never retry).

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::storage::models::{Principal, PrincipalClass, Role};

use super::generator::generate_session_id;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Token invalid: {0}")]
    Invalid(String),
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Which class of token a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

impl TokenUse {
    fn kid(self) -> &'static str {
        match self {
            TokenUse::Access => "access",
            TokenUse::Refresh => "refresh",
        }
    }
}

/// Identity facts bound into every token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalClaims {
    pub class: PrincipalClass,
    pub principal_id: String,
    pub role: Role,
    pub tenant_id: Option<u64>,
}

impl From<&Principal> for PrincipalClaims {
    fn from(principal: &Principal) -> Self {
        Self {
            class: principal.class,
            principal_id: principal.id.clone(),
            role: principal.role,
            tenant_id: principal.tenant_id,
        }
    }
}

/// JWT payload shared by both token classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub class: PrincipalClass,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
    pub role: Role,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<u64>,
    pub typ: TokenUse,
}

impl Claims {
    pub fn principal(&self) -> PrincipalClaims {
        PrincipalClaims {
            class: self.class,
            principal_id: self.sub.clone(),
            role: self.role,
            tenant_id: self.tenant_id,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        from_timestamp(self.exp)
    }
}

/// A freshly minted token and the facts the caller needs to track it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub expires_at: DateTime<Utc>,
    pub jti: String,
    pub token: String,
}

struct SigningKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenIssuer {
    access: SigningKeys,
    access_ttl: Duration,
    clock: Arc<dyn Clock>,
    issuer: String,
    refresh: SigningKeys,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if config.access_secret == config.refresh_secret {
            return Err(TokenError::Signing(
                "access and refresh tokens must use distinct secrets".to_string(),
            ));
        }

        Ok(Self {
            access: SigningKeys::from_secret(&config.access_secret),
            access_ttl: ttl(config.access_ttl_seconds)?,
            clock,
            issuer: config.issuer.clone(),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            refresh_ttl: ttl(config.refresh_ttl_seconds)?,
        })
    }

    pub fn issue_access_token(&self, claims: &PrincipalClaims) -> Result<IssuedToken, TokenError> {
        self.issue(claims, TokenUse::Access)
    }

    /// The returned `jti` identifies the session record tracking this token.
    pub fn issue_refresh_token(&self, claims: &PrincipalClaims) -> Result<IssuedToken, TokenError> {
        self.issue(claims, TokenUse::Refresh)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenUse::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenUse::Refresh)
    }

    fn keys(&self, kind: TokenUse) -> (&SigningKeys, Duration) {
        match kind {
            TokenUse::Access => (&self.access, self.access_ttl),
            TokenUse::Refresh => (&self.refresh, self.refresh_ttl),
        }
    }

    fn issue(&self, principal: &PrincipalClaims, kind: TokenUse) -> Result<IssuedToken, TokenError> {
        let (keys, ttl) = self.keys(kind);
        let now = self.clock.now();
        let iat = now.timestamp();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("token expiry is out of range".to_string()))?
            .timestamp();

        let claims = Claims {
            class: principal.class,
            exp,
            iat,
            iss: self.issuer.clone(),
            jti: generate_session_id(),
            role: principal.role,
            sub: principal.principal_id.clone(),
            tenant_id: principal.tenant_id,
            typ: kind,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kind.kid().to_string());

        let token = encode(&header, &claims, &keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            expires_at: from_timestamp(exp),
            jti: claims.jti,
            token,
        })
    }

    fn verify(&self, token: &str, kind: TokenUse) -> Result<Claims, TokenError> {
        let (keys, _) = self.keys(kind);

        // Expiry is checked below against the injected clock
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.header.kid.as_deref() != Some(kind.kid()) || data.claims.typ != kind {
            return Err(TokenError::Invalid("wrong token class".to_string()));
        }
        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

fn ttl(seconds: u64) -> Result<Duration, TokenError> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| TokenError::Signing(format!("token lifetime of {seconds}s is out of range")))
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
