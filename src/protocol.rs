//! Session protocol: the only path by which sessions change state.
//!
//! ```text
//! ANONYMOUS --login--> AUTHENTICATED --refresh--> AUTHENTICATED ...
//!                           |
//!                           +--logout / logout_all--> REVOKED
//! ```
//!
//! REVOKED is terminal for a refresh-token value. A principal leaves it only
//! by logging in again, which opens a new session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::authz::{self, Capability};
use crate::clock::Clock;
use crate::config::Config;
use crate::credentials::{normalize_identifier, CredentialVerifier, PasswordHashing};
use crate::device;
use crate::error::AuthError;
use crate::storage::models::{
    ClientMetadata, DeviceInfo, Principal, PrincipalClass, Role, SessionRecord, SessionStatus,
};
use crate::storage::{PrincipalStore, SessionStore};
use crate::tokens::generator::generate_session_id;
use crate::tokens::issuer::{IssuedToken, PrincipalClaims, TokenIssuer};
use crate::tokens::ledger::{LedgerError, NewSession, SessionLedger};

/// Login input as received from the client
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    #[serde(skip)]
    pub metadata: ClientMetadata,
    pub password: String,
    #[serde(default)]
    pub tenant_id: Option<u64>,
}

/// What a client may know about a principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalSummary {
    pub class: PrincipalClass,
    pub display_name: String,
    pub id: String,
    pub identifier: String,
    pub role: Role,
    pub tenant_id: Option<u64>,
}

impl From<&Principal> for PrincipalSummary {
    fn from(principal: &Principal) -> Self {
        Self {
            class: principal.class,
            display_name: principal.display_name.clone(),
            id: principal.id.clone(),
            identifier: principal.identifier.clone(),
            role: principal.role,
            tenant_id: principal.tenant_id,
        }
    }
}

/// Result of a successful login or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_expires_at: DateTime<Utc>,
    pub access_token: String,
    pub principal: PrincipalSummary,
    pub refresh_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub session_id: String,
}

/// Verified caller identity handed to request handlers
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub expires_at: DateTime<Utc>,
    pub principal: PrincipalClaims,
    pub token_id: String,
}

impl SessionContext {
    pub fn principal_id(&self) -> &str {
        &self.principal.principal_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.principal.class == PrincipalClass::SuperAdmin
    }
}

/// One of a principal's sessions, as listed back to them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub created_at: DateTime<Utc>,
    pub device: String,
    pub device_info: DeviceInfo,
    pub expires_at: DateTime<Utc>,
    pub id: String,
    pub ip_address: Option<String>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

impl SessionSummary {
    fn from_record(record: SessionRecord, now: DateTime<Utc>) -> Self {
        Self {
            created_at: record.created_at,
            device: device::describe(&record.metadata.device_info),
            expires_at: record.expires_at,
            id: record.id.clone(),
            ip_address: record.metadata.ip_address.clone(),
            last_rotated_at: record.last_rotated_at,
            status: record.status_at(now),
            device_info: record.metadata.device_info,
        }
    }
}

/// Input for creating a principal
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrincipal {
    pub display_name: Option<String>,
    pub identifier: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub tenant_id: Option<u64>,
}

pub struct SessionProtocol {
    issuer: TokenIssuer,
    ledger: SessionLedger,
    principals: Arc<dyn PrincipalStore>,
    verifier: CredentialVerifier,
}

impl SessionProtocol {
    pub fn new(
        config: &Config,
        principals: Arc<dyn PrincipalStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let hashing = PasswordHashing::new(&config.passwords)?;
        Ok(Self {
            issuer: TokenIssuer::new(&config.tokens, Arc::clone(&clock))?,
            ledger: SessionLedger::new(sessions, clock),
            verifier: CredentialVerifier::new(Arc::clone(&principals), hashing)?,
            principals,
        })
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// ANONYMOUS -> AUTHENTICATED.
    ///
    /// Either the pair is returned and its session recorded, or neither.
    pub fn login(&self, request: LoginRequest) -> Result<TokenPair, AuthError> {
        let principal =
            self.verifier
                .verify(&request.identifier, request.tenant_id, &request.password)?;

        let (pair, refresh) = self.mint(&principal)?;
        self.ledger
            .create(new_session(&principal, &refresh, request.metadata))
            .map_err(|e| {
                tracing::error!(principal_id = %principal.id, error = %e, "Failed to record session, discarding tokens");
                AuthError::from(e)
            })?;

        tracing::info!(
            principal_id = %principal.id,
            session_id = %pair.session_id,
            "Login succeeded"
        );
        Ok(pair)
    }

    /// AUTHENTICATED -> REFRESH_PENDING -> AUTHENTICATED.
    ///
    /// Claims in the new pair come from the principal store, not the old
    /// token. `metadata` replaces the recorded client details when given.
    pub fn refresh(
        &self,
        refresh_token: &str,
        metadata: Option<ClientMetadata>,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.verify_refresh_token(refresh_token)?;

        let Some(record) = self.ledger.lookup(refresh_token)? else {
            tracing::warn!(session_id = %claims.jti, "Refresh with unknown, revoked or expired session");
            return Err(AuthError::TokenInvalid);
        };
        if record.principal_id != claims.sub || record.id != claims.jti {
            tracing::warn!(session_id = %record.id, "Refresh token does not match its session");
            return Err(AuthError::TokenInvalid);
        }

        let principal = match self.principals.get_principal(&record.principal_id)? {
            Some(p) if p.active => p,
            _ => {
                self.ledger.revoke(refresh_token)?;
                tracing::warn!(principal_id = %record.principal_id, "Refresh for missing or disabled principal");
                return Err(AuthError::TokenInvalid);
            }
        };

        let (pair, refresh) = self.mint(&principal)?;
        let metadata = metadata.unwrap_or(record.metadata);
        match self
            .ledger
            .rotate(refresh_token, new_session(&principal, &refresh, metadata))
        {
            Ok(_) => {
                tracing::debug!(
                    principal_id = %principal.id,
                    previous_session_id = %record.id,
                    session_id = %pair.session_id,
                    "Session refreshed"
                );
                Ok(pair)
            }
            Err(LedgerError::InvalidToken) => {
                tracing::warn!(session_id = %record.id, "Lost a concurrent refresh");
                Err(AuthError::RotationConflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// AUTHENTICATED -> REVOKED for one session. Idempotent.
    pub fn logout(&self, refresh_token: &str) -> Result<usize, AuthError> {
        Ok(self.ledger.revoke(refresh_token)?)
    }

    /// AUTHENTICATED -> REVOKED for every session of the principal.
    pub fn logout_all(&self, principal_id: &str) -> Result<usize, AuthError> {
        Ok(self.ledger.revoke_all(principal_id)?)
    }

    /// Verify an access token. Stateless: signature and expiry only.
    pub fn authenticate(&self, access_token: &str) -> Result<SessionContext, AuthError> {
        let claims = self.issuer.verify_access_token(access_token)?;
        Ok(SessionContext {
            expires_at: claims.expires_at(),
            principal: claims.principal(),
            token_id: claims.jti,
        })
    }

    /// Current profile of the caller
    pub fn me(&self, context: &SessionContext) -> Result<PrincipalSummary, AuthError> {
        match self.principals.get_principal(context.principal_id())? {
            Some(principal) => Ok(PrincipalSummary::from(&principal)),
            None => Err(AuthError::TokenInvalid),
        }
    }

    /// Live sessions of a principal, newest first
    pub fn sessions(&self, principal_id: &str) -> Result<Vec<SessionSummary>, AuthError> {
        let now = self.ledger.now();
        Ok(self
            .ledger
            .list_active(principal_id)?
            .into_iter()
            .map(|record| SessionSummary::from_record(record, now))
            .collect())
    }

    /// Revoke one of the caller's own sessions by its public id
    pub fn revoke_session(&self, principal_id: &str, session_id: &str) -> Result<(), AuthError> {
        if self.ledger.revoke_by_id(principal_id, session_id)? {
            Ok(())
        } else {
            Err(AuthError::NotFound("Session not found".to_string()))
        }
    }

    /// Create a principal on behalf of an authenticated caller.
    ///
    /// Admins act only within their own tenant; administrative roles are
    /// granted only by super-admins.
    pub fn create_principal(
        &self,
        actor: &SessionContext,
        request: NewPrincipal,
    ) -> Result<PrincipalSummary, AuthError> {
        authz::authorize(&actor.principal, &[Capability::ManagePrincipals])?;
        authz::ensure_can_assign(&actor.principal, request.role)?;

        let (class, tenant_id) = match (request.role, request.tenant_id) {
            (Role::SuperAdmin, _) => (PrincipalClass::SuperAdmin, None),
            (_, Some(tenant_id)) => {
                authz::ensure_tenant(&actor.principal, tenant_id)?;
                (PrincipalClass::User, Some(tenant_id))
            }
            (_, None) => return Err(AuthError::bad_request("tenant_id is required")),
        };

        let principal = self.register(
            &request.identifier,
            request.display_name,
            &request.password,
            request.role,
            class,
            tenant_id,
        )?;
        tracing::info!(
            principal_id = %principal.id,
            created_by = %actor.principal_id(),
            role = %principal.role,
            "Principal created"
        );
        Ok(PrincipalSummary::from(&principal))
    }

    /// Seed a super-admin if none exists under `email`. Returns true if created.
    pub fn bootstrap_super_admin(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let key = crate::storage::models::super_admin_login_key(&normalize_identifier(email));
        if self.principals.find_principal_by_login(&key)?.is_some() {
            return Ok(false);
        }
        self.register(
            email,
            None,
            password,
            Role::SuperAdmin,
            PrincipalClass::SuperAdmin,
            None,
        )?;
        Ok(true)
    }

    /// Delete every session record. Test mode only, super-admins only.
    pub fn purge_sessions(&self, actor: &SessionContext) -> Result<usize, AuthError> {
        if !actor.is_super_admin() {
            return Err(AuthError::forbidden("Only a super-admin can purge sessions"));
        }
        Ok(self.ledger.purge_all()?)
    }

    fn register(
        &self,
        identifier: &str,
        display_name: Option<String>,
        password: &str,
        role: Role,
        class: PrincipalClass,
        tenant_id: Option<u64>,
    ) -> Result<Principal, AuthError> {
        let identifier = normalize_identifier(identifier);
        if identifier.is_empty() {
            return Err(AuthError::bad_request("identifier is required"));
        }
        if password.is_empty() {
            return Err(AuthError::bad_request("password is required"));
        }

        let principal = Principal {
            active: true,
            class,
            created_at: self.ledger.now(),
            display_name: display_name.unwrap_or_else(|| identifier.clone()),
            id: generate_session_id(),
            identifier,
            password_hash: Some(self.verifier.hashing().hash(password)?),
            role,
            tenant_id,
        };
        self.principals.put_principal(&principal)?;
        Ok(principal)
    }

    fn mint(&self, principal: &Principal) -> Result<(TokenPair, IssuedToken), AuthError> {
        let claims = PrincipalClaims::from(principal);
        let access = self.issuer.issue_access_token(&claims)?;
        let refresh = self.issuer.issue_refresh_token(&claims)?;

        let pair = TokenPair {
            access_expires_at: access.expires_at,
            access_token: access.token,
            principal: PrincipalSummary::from(principal),
            refresh_expires_at: refresh.expires_at,
            refresh_token: refresh.token.clone(),
            session_id: refresh.jti.clone(),
        };
        Ok((pair, refresh))
    }
}

fn new_session(principal: &Principal, refresh: &IssuedToken, metadata: ClientMetadata) -> NewSession {
    NewSession {
        class: principal.class,
        expires_at: refresh.expires_at,
        id: refresh.jti.clone(),
        metadata,
        principal_id: principal.id.clone(),
        tenant_id: principal.tenant_id,
        token: refresh.token.clone(),
    }
}
