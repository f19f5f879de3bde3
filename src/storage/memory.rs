//! In-process store used for tests and single-instance deployments without a
//! data directory.
//!
//! Session records are sharded by token fingerprint so unrelated sessions do
//! not contend. Rotation holds the two affected shards (always locked in
//! ascending shard order), `revoke_subject_sessions` holds every shard.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::models::{Principal, SessionRecord};
use super::store::{PrincipalStore, SessionStore, StoreError};

const DEFAULT_SHARDS: usize = 16;

type Shard = HashMap<String, SessionRecord>;

pub struct MemoryStore {
    logins: RwLock<HashMap<String, String>>,
    principals: RwLock<HashMap<String, Principal>>,
    shards: Vec<Mutex<Shard>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        Self {
            logins: RwLock::new(HashMap::new()),
            principals: RwLock::new(HashMap::new()),
            shards: (0..count).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_index(&self, token_hash: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token_hash.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn shard(&self, token_hash: &str) -> MutexGuard<'_, Shard> {
        self.shards[self.shard_index(token_hash)].lock()
    }

    fn find_in_shards<F>(&self, mut predicate: F) -> Vec<SessionRecord>
    where
        F: FnMut(&SessionRecord) -> bool,
    {
        let mut found = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock();
            found.extend(shard.values().filter(|r| predicate(r)).cloned());
        }
        found
    }
}

impl SessionStore for MemoryStore {
    fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut shard = self.shard(&record.token_hash);
        if shard.contains_key(&record.token_hash) {
            return Err(StoreError::DuplicateToken);
        }
        shard.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.shard(token_hash).get(token_hash).cloned())
    }

    fn get_session_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.find_in_shards(|r| r.id == id).into_iter().next())
    }

    fn rotate_session(
        &self,
        old_token_hash: &str,
        replacement: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let old_index = self.shard_index(old_token_hash);
        let new_index = self.shard_index(&replacement.token_hash);

        let (mut old_shard, mut new_shard) = match old_index.cmp(&new_index) {
            std::cmp::Ordering::Equal => (self.shards[old_index].lock(), None),
            std::cmp::Ordering::Less => {
                let old = self.shards[old_index].lock();
                let new = self.shards[new_index].lock();
                (old, Some(new))
            }
            std::cmp::Ordering::Greater => {
                let new = self.shards[new_index].lock();
                let old = self.shards[old_index].lock();
                (old, Some(new))
            }
        };

        let valid = old_shard.get(old_token_hash).is_some_and(|record| {
            record.is_active_at(now) && record.principal_id == replacement.principal_id
        });
        if !valid {
            return Ok(None);
        }

        let target = new_shard.as_deref_mut().unwrap_or(&mut *old_shard);
        if target.contains_key(&replacement.token_hash) {
            return Err(StoreError::DuplicateToken);
        }
        target.insert(replacement.token_hash.clone(), replacement.clone());

        let Some(previous) = old_shard.get_mut(old_token_hash) else {
            return Ok(None);
        };
        previous.mark_revoked(now, Some(replacement.id.clone()));
        Ok(Some(previous.clone()))
    }

    fn revoke_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut shard = self.shard(token_hash);
        match shard.get_mut(token_hash) {
            Some(record) if !record.revoked => {
                record.mark_revoked(now, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn revoke_subject_sessions(
        &self,
        principal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        // Hold every shard so a concurrent rotation cannot slip a fresh
        // record past the sweep.
        let mut guards: Vec<_> = self.shards.iter().map(|s| s.lock()).collect();

        let mut revoked = 0;
        for shard in guards.iter_mut() {
            for record in shard.values_mut() {
                if record.principal_id == principal_id && !record.revoked {
                    record.mark_revoked(now, None);
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    fn sessions_by_subject(&self, principal_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.find_in_shards(|r| r.principal_id == principal_id))
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, r| r.expires_at > now);
            removed += before - shard.len();
        }
        Ok(removed)
    }

    fn purge_sessions(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            removed += shard.len();
            shard.clear();
        }
        Ok(removed)
    }
}

impl PrincipalStore for MemoryStore {
    fn put_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let login_key = principal.login_key();
        let mut logins = self.logins.write();
        let mut principals = self.principals.write();

        if logins.get(&login_key).is_some_and(|id| id != &principal.id) {
            return Err(StoreError::DuplicateIdentifier);
        }
        if let Some(previous) = principals.get(&principal.id) {
            let previous_key = previous.login_key();
            if previous_key != login_key {
                logins.remove(&previous_key);
            }
        }
        logins.insert(login_key, principal.id.clone());
        principals.insert(principal.id.clone(), principal.clone());
        Ok(())
    }

    fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.read().get(id).cloned())
    }

    fn find_principal_by_login(&self, login_key: &str) -> Result<Option<Principal>, StoreError> {
        let Some(id) = self.logins.read().get(login_key).cloned() else {
            return Ok(None);
        };
        Ok(self.principals.read().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{tenant_login_key, Role};
    use crate::testutil::{make_principal, make_record};

    #[test]
    fn test_rotation_within_one_shard() {
        let store = MemoryStore::with_shards(1);
        let now = Utc::now();
        let old = make_record("s1", "user-1");
        store.insert_session(&old).unwrap();

        let new = make_record("s2", "user-1");
        assert!(store.rotate_session(&old.token_hash, &new, now).unwrap().is_some());
        assert!(store.get_session(&old.token_hash).unwrap().unwrap().revoked);
        assert!(store.get_session(&new.token_hash).unwrap().unwrap().is_active_at(now));
        assert!(store.rotate_session(&old.token_hash, &new, now).unwrap().is_none());
    }

    #[test]
    fn test_rotation_rejects_duplicate_replacement() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = make_record("s1", "user-1");
        let taken = make_record("s2", "user-1");
        store.insert_session(&old).unwrap();
        store.insert_session(&taken).unwrap();

        assert!(matches!(
            store.rotate_session(&old.token_hash, &taken, now),
            Err(StoreError::DuplicateToken)
        ));
        assert!(!store.get_session(&old.token_hash).unwrap().unwrap().revoked);
    }

    #[test]
    fn test_delete_expired_and_lookup_by_id() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut expired = make_record("s1", "user-1");
        expired.expires_at = now;
        store.insert_session(&expired).unwrap();
        store.insert_session(&make_record("s2", "user-1")).unwrap();

        assert_eq!(store.delete_expired_sessions(now).unwrap(), 1);
        assert!(store.get_session_by_id("s1").unwrap().is_none());
        assert!(store.get_session_by_id("s2").unwrap().is_some());
    }

    #[test]
    fn test_principal_login_index() {
        let store = MemoryStore::new();
        let dana = make_principal("dana@school.test", Role::Accountant, Some(9));
        store.put_principal(&dana).unwrap();

        let found = store
            .find_principal_by_login(&tenant_login_key(9, "dana@school.test"))
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(dana.id.clone()));

        let clash = make_principal("dana@school.test", Role::Teacher, Some(9));
        assert!(matches!(
            store.put_principal(&clash),
            Err(StoreError::DuplicateIdentifier)
        ));
    }
}
