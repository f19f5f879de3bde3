//! Persistence seams used by the credential verifier and the session ledger.
//!
//! Both traits are synchronous: every call is one bounded store access.
//! Async callers run them directly (cheap lookups) or inside
//! `spawn_blocking` (bulk housekeeping).

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::db::DatabaseError;
use super::models::{Principal, SessionRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Identifier already registered")]
    DuplicateIdentifier,
    #[error("Session token already exists")]
    DuplicateToken,
}

/// Keyed storage for session records.
pub trait SessionStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateToken` if the fingerprint exists.
    fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Fetch a record by token fingerprint, whatever its state.
    fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Fetch a record by its public session id, whatever its state.
    fn get_session_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Atomically revoke `old_token_hash` and insert `replacement`.
    ///
    /// Returns the revoked predecessor, or `None` without mutating anything
    /// when the old record is missing, revoked, expired at `now`, or owned by
    /// another principal.
    fn rotate_session(
        &self,
        old_token_hash: &str,
        replacement: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Mark one record revoked. Returns false if missing or already revoked.
    fn revoke_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Mark every non-revoked record of a principal revoked.
    fn revoke_subject_sessions(
        &self,
        principal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// All records owned by a principal, whatever their state.
    fn sessions_by_subject(&self, principal_id: &str) -> Result<Vec<SessionRecord>, StoreError>;

    /// Delete records with `expires_at <= now`. Returns how many were removed.
    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Delete every session record. Test mode only.
    fn purge_sessions(&self) -> Result<usize, StoreError>;
}

/// Keyed storage for principals.
pub trait PrincipalStore: Send + Sync {
    /// Insert or replace a principal, keeping the login index in step.
    fn put_principal(&self, principal: &Principal) -> Result<(), StoreError>;

    fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError>;

    /// Resolve a login key (see `Principal::login_key`) to a principal.
    fn find_principal_by_login(&self, login_key: &str) -> Result<Option<Principal>, StoreError>;
}
