use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::SessionRecord;
use super::store::{SessionStore, StoreError};
use super::tables::*;

/// Result of a rotation attempt inside a single write transaction
enum Rotation {
    Duplicate,
    Rejected,
    Rotated(SessionRecord),
}

impl Database {
    // ========================================================================
    // Session operations
    // ========================================================================

    fn insert_session_txn(&self, record: &SessionRecord) -> Result<bool, DatabaseError> {
        debug_assert!(!record.token_hash.is_empty(), "token hash must not be empty");
        debug_assert!(!record.principal_id.is_empty(), "principal id must not be empty");

        let write_txn = self.begin_write()?;
        if load_record(&write_txn, &record.token_hash)?.is_some() {
            write_txn.abort()?;
            return Ok(false);
        }
        store_record(&write_txn, record)?;
        index_record(&write_txn, record)?;
        write_txn.commit()?;
        Ok(true)
    }

    fn rotate_session_txn(
        &self,
        old_token_hash: &str,
        replacement: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<Rotation, DatabaseError> {
        let write_txn = self.begin_write()?;

        let mut previous = match load_record(&write_txn, old_token_hash)? {
            Some(record)
                if record.is_active_at(now) && record.principal_id == replacement.principal_id =>
            {
                record
            }
            _ => {
                write_txn.abort()?;
                return Ok(Rotation::Rejected);
            }
        };

        if load_record(&write_txn, &replacement.token_hash)?.is_some() {
            write_txn.abort()?;
            return Ok(Rotation::Duplicate);
        }

        previous.mark_revoked(now, Some(replacement.id.clone()));
        store_record(&write_txn, &previous)?;
        store_record(&write_txn, replacement)?;
        index_record(&write_txn, replacement)?;
        write_txn.commit()?;

        Ok(Rotation::Rotated(previous))
    }

    fn revoke_session_txn(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        match load_record(&write_txn, token_hash)? {
            Some(mut record) if !record.revoked => {
                record.mark_revoked(now, None);
                store_record(&write_txn, &record)?;
                write_txn.commit()?;
                Ok(true)
            }
            _ => {
                write_txn.abort()?;
                Ok(false)
            }
        }
    }

    fn revoke_subject_sessions_txn(
        &self,
        principal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let write_txn = self.begin_write()?;
        let hashes = subject_hashes(&write_txn, principal_id)?;

        let mut revoked = 0;
        for hash in hashes {
            if let Some(mut record) = load_record(&write_txn, &hash)? {
                if !record.revoked {
                    record.mark_revoked(now, None);
                    store_record(&write_txn, &record)?;
                    revoked += 1;
                }
            }
        }

        write_txn.commit()?;
        Ok(revoked)
    }

    fn get_session_txn(&self, token_hash: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        let result = match table.get(token_hash)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        Ok(result)
    }

    fn get_session_by_id_txn(&self, id: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let id_table = read_txn.open_table(SESSION_IDS)?;
        let sessions_table = read_txn.open_table(SESSIONS)?;

        let token_hash = match id_table.get(id)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let result = match sessions_table.get(token_hash.as_str())? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        Ok(result)
    }

    fn sessions_by_subject_txn(
        &self,
        principal_id: &str,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(SUBJECT_SESSIONS)?;
        let sessions_table = read_txn.open_table(SESSIONS)?;

        let hashes: Vec<String> = match index_table.get(principal_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut sessions = Vec::new();
        for hash in hashes {
            if let Some(data) = sessions_table.get(hash.as_str())? {
                let record: SessionRecord = rmp_serde::from_slice(data.value())?;
                sessions.push(record);
            }
        }

        Ok(sessions)
    }

    /// Delete expired sessions using the expiration index (no full table scan).
    ///
    /// Index keys only carry milliseconds, so records in the boundary
    /// millisecond are checked against their exact `expires_at`.
    fn delete_expired_sessions_txn(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let now_ms = now.timestamp_millis();
        let write_txn = self.begin_write()?;

        let candidates: Vec<(String, String)> = {
            let table = write_txn.open_table(SESSION_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let key_str = key.value().to_string();
                match expiry_key_ms(&key_str) {
                    Some(ms) if ms <= now_ms => {
                        result.push((key_str, value.value().to_string()));
                    }
                    _ => break,
                }
            }
            result
        };

        if candidates.is_empty() {
            write_txn.abort()?;
            return Ok(0);
        }

        let mut removed = 0;
        for (key, hash) in &candidates {
            match load_record(&write_txn, hash)? {
                Some(record) if record.expires_at <= now => {
                    {
                        let mut table = write_txn.open_table(SESSIONS)?;
                        table.remove(hash.as_str())?;
                    }
                    unindex_record(&write_txn, &record)?;
                    removed += 1;
                }
                Some(_) => {}
                None => {
                    // Stale index entry
                    let mut table = write_txn.open_table(SESSION_EXPIRY)?;
                    table.remove(key.as_str())?;
                }
            }
        }

        write_txn.commit()?;
        Ok(removed)
    }

    fn purge_sessions_txn(&self) -> Result<usize, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut purged = 0;

        // Clear sessions - collect keys first, then remove
        {
            let table = write_txn.open_table(SESSIONS)?;
            let keys = collect_keys(&table)?;
            drop(table);

            let mut table = write_txn.open_table(SESSIONS)?;
            for key in keys {
                table.remove(key.as_str())?;
                purged += 1;
            }
        }

        // Clear index tables
        {
            let table = write_txn.open_table(SUBJECT_SESSIONS)?;
            let keys = collect_keys(&table)?;
            drop(table);

            let mut table = write_txn.open_table(SUBJECT_SESSIONS)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }
        for definition in [SESSION_IDS, SESSION_EXPIRY] {
            let table = write_txn.open_table(definition)?;
            let keys = collect_keys(&table)?;
            drop(table);

            let mut table = write_txn.open_table(definition)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }

        write_txn.commit()?;
        Ok(purged)
    }
}

impl SessionStore for Database {
    fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if self.insert_session_txn(record)? {
            Ok(())
        } else {
            Err(StoreError::DuplicateToken)
        }
    }

    fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.get_session_txn(token_hash)?)
    }

    fn get_session_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.get_session_by_id_txn(id)?)
    }

    fn rotate_session(
        &self,
        old_token_hash: &str,
        replacement: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        match self.rotate_session_txn(old_token_hash, replacement, now)? {
            Rotation::Rotated(previous) => Ok(Some(previous)),
            Rotation::Rejected => Ok(None),
            Rotation::Duplicate => Err(StoreError::DuplicateToken),
        }
    }

    fn revoke_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.revoke_session_txn(token_hash, now)?)
    }

    fn revoke_subject_sessions(
        &self,
        principal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self.revoke_subject_sessions_txn(principal_id, now)?)
    }

    fn sessions_by_subject(&self, principal_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.sessions_by_subject_txn(principal_id)?)
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.delete_expired_sessions_txn(now)?)
    }

    fn purge_sessions(&self) -> Result<usize, StoreError> {
        Ok(self.purge_sessions_txn()?)
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

fn load_record(
    txn: &WriteTransaction,
    token_hash: &str,
) -> Result<Option<SessionRecord>, DatabaseError> {
    let table = txn.open_table(SESSIONS)?;
    let result = match table.get(token_hash)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(result)
}

fn store_record(txn: &WriteTransaction, record: &SessionRecord) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(SESSIONS)?;
    let data = rmp_serde::to_vec_named(record)?;
    table.insert(record.token_hash.as_str(), data.as_slice())?;
    Ok(())
}

fn subject_hashes(txn: &WriteTransaction, principal_id: &str) -> Result<Vec<String>, DatabaseError> {
    let table = txn.open_table(SUBJECT_SESSIONS)?;
    let hashes = table
        .get(principal_id)?
        .map(|v| rmp_serde::from_slice(v.value()))
        .transpose()?
        .unwrap_or_default();
    Ok(hashes)
}

fn index_record(txn: &WriteTransaction, record: &SessionRecord) -> Result<(), DatabaseError> {
    {
        let mut id_table = txn.open_table(SESSION_IDS)?;
        id_table.insert(record.id.as_str(), record.token_hash.as_str())?;
    }

    let mut hashes = subject_hashes(txn, &record.principal_id)?;
    if !hashes.contains(&record.token_hash) {
        hashes.push(record.token_hash.clone());
        let data = rmp_serde::to_vec_named(&hashes)?;
        let mut index_table = txn.open_table(SUBJECT_SESSIONS)?;
        index_table.insert(record.principal_id.as_str(), data.as_slice())?;
    }

    let mut expiry_table = txn.open_table(SESSION_EXPIRY)?;
    let ek = expiry_key(&record.expires_at, &record.token_hash);
    expiry_table.insert(ek.as_str(), record.token_hash.as_str())?;
    Ok(())
}

fn unindex_record(txn: &WriteTransaction, record: &SessionRecord) -> Result<(), DatabaseError> {
    {
        let mut id_table = txn.open_table(SESSION_IDS)?;
        id_table.remove(record.id.as_str())?;
    }

    let mut hashes = subject_hashes(txn, &record.principal_id)?;
    hashes.retain(|h| h != &record.token_hash);
    {
        let mut index_table = txn.open_table(SUBJECT_SESSIONS)?;
        if hashes.is_empty() {
            index_table.remove(record.principal_id.as_str())?;
        } else {
            let data = rmp_serde::to_vec_named(&hashes)?;
            index_table.insert(record.principal_id.as_str(), data.as_slice())?;
        }
    }

    let mut expiry_table = txn.open_table(SESSION_EXPIRY)?;
    let ek = expiry_key(&record.expires_at, &record.token_hash);
    expiry_table.remove(ek.as_str())?;
    Ok(())
}

fn collect_keys<V: redb::Value + 'static>(
    table: &impl ReadableTable<&'static str, V>,
) -> Result<Vec<String>, DatabaseError> {
    let keys = table
        .iter()?
        .map(|r| r.map(|(k, _)| k.value().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}
