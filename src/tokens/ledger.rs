//! The authoritative record of outstanding refresh tokens.
//!
//! Records are keyed by the SHA-256 fingerprint of the refresh token. A
//! record that is revoked, rotated or past its expiry is reported exactly
//! like one that never existed.
//!
//! Rotation revokes the presented token in the same critical section that
//! stores its successor. If the response carrying the successor never
//! reaches the client, the client has to log in again: the old value stays
//! dead regardless.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::storage::models::{ClientMetadata, PrincipalClass, SessionRecord};
use crate::storage::{SessionStore, StoreError};

use super::generator::hash_token;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Session token already exists")]
    DuplicateToken,
    #[error("Session token is not valid")]
    InvalidToken,
    #[error("Session store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateToken => LedgerError::DuplicateToken,
            other => LedgerError::Store(other),
        }
    }
}

/// Everything needed to open a session record
#[derive(Debug, Clone)]
pub struct NewSession {
    pub class: PrincipalClass,
    pub expires_at: DateTime<Utc>,
    pub id: String,
    pub metadata: ClientMetadata,
    pub principal_id: String,
    pub tenant_id: Option<u64>,
    /// Raw refresh token value; only its fingerprint is stored
    pub token: String,
}

impl NewSession {
    fn into_record(self, now: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            class: self.class,
            created_at: now,
            expires_at: self.expires_at,
            id: self.id,
            last_rotated_at: None,
            metadata: self.metadata,
            principal_id: self.principal_id,
            replaced_by: None,
            revoked: false,
            revoked_at: None,
            tenant_id: self.tenant_id,
            token_hash: hash_token(&self.token),
        }
    }
}

#[derive(Clone)]
pub struct SessionLedger {
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { clock, store }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a new session record
    pub fn create(&self, session: NewSession) -> Result<SessionRecord, LedgerError> {
        let record = session.into_record(self.clock.now());
        self.store.insert_session(&record)?;
        tracing::debug!(
            session_id = %record.id,
            principal_id = %record.principal_id,
            "Created session"
        );
        Ok(record)
    }

    /// Return the record for a token only if it is live right now
    pub fn lookup(&self, token: &str) -> Result<Option<SessionRecord>, LedgerError> {
        let now = self.clock.now();
        let record = self.store.get_session(&hash_token(token))?;
        Ok(record.filter(|r| r.is_active_at(now)))
    }

    /// Atomically retire `old_token` and open `replacement` in its place.
    ///
    /// Fails with `InvalidToken`, leaving the store untouched, when the old
    /// token is not live or belongs to another principal. Of two concurrent
    /// rotations of the same token exactly one succeeds.
    pub fn rotate(
        &self,
        old_token: &str,
        replacement: NewSession,
    ) -> Result<SessionRecord, LedgerError> {
        let now = self.clock.now();
        let mut record = replacement.into_record(now);
        record.last_rotated_at = Some(now);

        match self.store.rotate_session(&hash_token(old_token), &record, now)? {
            Some(previous) => {
                tracing::debug!(
                    previous_session_id = %previous.id,
                    session_id = %record.id,
                    principal_id = %record.principal_id,
                    "Rotated session"
                );
                Ok(record)
            }
            None => Err(LedgerError::InvalidToken),
        }
    }

    /// Revoke one session. Returns 0 if it was unknown or already revoked.
    pub fn revoke(&self, token: &str) -> Result<usize, LedgerError> {
        let revoked = self.store.revoke_session(&hash_token(token), self.clock.now())?;
        if revoked {
            tracing::debug!("Revoked session");
        }
        Ok(usize::from(revoked))
    }

    /// Revoke every live session of a principal ("log out everywhere")
    pub fn revoke_all(&self, principal_id: &str) -> Result<usize, LedgerError> {
        let count = self
            .store
            .revoke_subject_sessions(principal_id, self.clock.now())?;
        tracing::debug!(principal_id = %principal_id, count, "Revoked all sessions");
        Ok(count)
    }

    /// Revoke a session by its public id, only on behalf of its owner
    pub fn revoke_by_id(&self, principal_id: &str, session_id: &str) -> Result<bool, LedgerError> {
        let Some(record) = self.store.get_session_by_id(session_id)? else {
            return Ok(false);
        };
        if record.principal_id != principal_id {
            return Ok(false);
        }
        let revoked = self.store.revoke_session(&record.token_hash, self.clock.now())?;
        if revoked {
            tracing::debug!(session_id = %session_id, principal_id = %principal_id, "Revoked session");
        }
        Ok(revoked)
    }

    /// All live sessions of a principal
    pub fn list_active(&self, principal_id: &str) -> Result<Vec<SessionRecord>, LedgerError> {
        let now = self.clock.now();
        let mut sessions: Vec<SessionRecord> = self
            .store
            .sessions_by_subject(principal_id)?
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Delete records past their expiry (called by background task)
    pub fn purge_expired(&self) -> Result<usize, LedgerError> {
        let cleaned = self.store.delete_expired_sessions(self.clock.now())?;
        if cleaned > 0 {
            tracing::info!(count = cleaned, "Cleaned up expired sessions");
        }
        Ok(cleaned)
    }

    /// Delete every record regardless of state. Test mode only.
    pub fn purge_all(&self) -> Result<usize, LedgerError> {
        Ok(self.store.purge_sessions()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::testutil::setup_db;
    use chrono::Duration;
    use std::sync::Barrier;

    fn new_session(id: &str, principal: &str, expires_at: DateTime<Utc>) -> NewSession {
        NewSession {
            class: PrincipalClass::User,
            expires_at,
            id: id.to_string(),
            metadata: ClientMetadata::default(),
            principal_id: principal.to_string(),
            tenant_id: Some(42),
            token: format!("refresh-{id}"),
        }
    }

    fn ledgers() -> Vec<(SessionLedger, Arc<ManualClock>, Option<tempfile::TempDir>)> {
        let mut out = Vec::new();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        out.push((SessionLedger::new(store, clock.clone()), clock, None));

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (db, temp) = setup_db();
        let store: Arc<dyn SessionStore> = Arc::new(db);
        out.push((SessionLedger::new(store, clock.clone()), clock, Some(temp)));

        out
    }

    #[test]
    fn test_create_and_lookup() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            let record = ledger.create(new_session("s1", "alice", expires)).unwrap();
            assert_ne!(record.token_hash, "refresh-s1");

            let found = ledger.lookup("refresh-s1").unwrap().unwrap();
            assert_eq!(found.id, "s1");
            assert!(ledger.lookup("refresh-unknown").unwrap().is_none());
        }
    }

    #[test]
    fn test_create_rejects_duplicate_token() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("s1", "alice", expires)).unwrap();
            let mut again = new_session("s2", "alice", expires);
            again.token = "refresh-s1".to_string();
            assert!(matches!(
                ledger.create(again),
                Err(LedgerError::DuplicateToken)
            ));
        }
    }

    #[test]
    fn test_rotation_invalidates_old_token() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("s1", "alice", expires)).unwrap();

            let rotated = ledger
                .rotate("refresh-s1", new_session("s2", "alice", expires))
                .unwrap();
            assert_eq!(rotated.id, "s2");
            assert!(rotated.last_rotated_at.is_some());

            assert!(ledger.lookup("refresh-s1").unwrap().is_none());
            assert!(!ledger.lookup("refresh-s2").unwrap().unwrap().revoked);

            // Replaying the rotated token fails and writes nothing
            assert!(matches!(
                ledger.rotate("refresh-s1", new_session("s3", "alice", expires)),
                Err(LedgerError::InvalidToken)
            ));
            assert!(ledger.lookup("refresh-s3").unwrap().is_none());
        }
    }

    #[test]
    fn test_rotation_of_garbage_token_creates_nothing() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            assert!(matches!(
                ledger.rotate("garbage", new_session("s1", "mallory", expires)),
                Err(LedgerError::InvalidToken)
            ));
            assert!(ledger.list_active("mallory").unwrap().is_empty());
        }
    }

    #[test]
    fn test_concurrent_rotation_has_one_winner() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("s0", "alice", expires)).unwrap();

            let barrier = Barrier::new(2);
            let results: Vec<Result<SessionRecord, LedgerError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = ["a", "b"]
                    .into_iter()
                    .map(|suffix| {
                        let ledger = &ledger;
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            ledger.rotate(
                                "refresh-s0",
                                new_session(&format!("s1{suffix}"), "alice", expires),
                            )
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let wins = results.iter().filter(|r| r.is_ok()).count();
            let losses = results
                .iter()
                .filter(|r| matches!(r, Err(LedgerError::InvalidToken)))
                .count();
            assert_eq!((wins, losses), (1, 1));
            assert_eq!(ledger.list_active("alice").unwrap().len(), 1);
        }
    }

    #[test]
    fn test_revoke_is_idempotent() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("s1", "alice", expires)).unwrap();

            assert_eq!(ledger.revoke("refresh-s1").unwrap(), 1);
            assert_eq!(ledger.revoke("refresh-s1").unwrap(), 0);
            assert!(ledger.lookup("refresh-s1").unwrap().is_none());
        }
    }

    #[test]
    fn test_revoke_all_is_scoped_to_principal() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("a1", "alice", expires)).unwrap();
            ledger.create(new_session("a2", "alice", expires)).unwrap();
            ledger.create(new_session("b1", "bob", expires)).unwrap();

            assert_eq!(ledger.revoke_all("alice").unwrap(), 2);
            assert!(ledger.lookup("refresh-a1").unwrap().is_none());
            assert!(ledger.lookup("refresh-a2").unwrap().is_none());
            assert!(ledger.lookup("refresh-b1").unwrap().is_some());
        }
    }

    #[test]
    fn test_expiry_boundary() {
        for (ledger, clock, _temp) in ledgers() {
            let now = clock.now();
            ledger.create(new_session("s1", "alice", now)).unwrap();
            ledger
                .create(new_session("s2", "alice", now + Duration::milliseconds(1)))
                .unwrap();

            assert!(ledger.lookup("refresh-s1").unwrap().is_none());
            assert!(ledger.lookup("refresh-s2").unwrap().is_some());

            clock.advance(Duration::milliseconds(1));
            assert!(ledger.lookup("refresh-s2").unwrap().is_none());
        }
    }

    #[test]
    fn test_revoke_by_id_requires_ownership() {
        for (ledger, clock, _temp) in ledgers() {
            let expires = clock.now() + Duration::days(7);
            ledger.create(new_session("s1", "alice", expires)).unwrap();

            assert!(!ledger.revoke_by_id("bob", "s1").unwrap());
            assert!(ledger.lookup("refresh-s1").unwrap().is_some());
            assert!(ledger.revoke_by_id("alice", "s1").unwrap());
            assert!(ledger.lookup("refresh-s1").unwrap().is_none());
        }
    }

    #[test]
    fn test_purge_expired() {
        for (ledger, clock, _temp) in ledgers() {
            let now = clock.now();
            ledger
                .create(new_session("s1", "alice", now + Duration::minutes(1)))
                .unwrap();
            ledger
                .create(new_session("s2", "alice", now + Duration::days(1)))
                .unwrap();

            clock.advance(Duration::minutes(2));
            assert_eq!(ledger.purge_expired().unwrap(), 1);
            assert_eq!(ledger.list_active("alice").unwrap().len(), 1);
        }
    }
}
