use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::Principal;
use super::store::{PrincipalStore, StoreError};
use super::tables::*;

impl Database {
    // ========================================================================
    // Principal operations
    // ========================================================================

    /// Upsert a principal. Returns false if its login key belongs to someone else.
    fn put_principal_txn(&self, principal: &Principal) -> Result<bool, DatabaseError> {
        debug_assert!(!principal.id.is_empty(), "principal id must not be empty");
        debug_assert!(
            !principal.identifier.is_empty(),
            "principal identifier must not be empty"
        );

        let login_key = principal.login_key();
        let write_txn = self.begin_write()?;

        let owner: Option<String> = {
            let logins = write_txn.open_table(PRINCIPAL_LOGINS)?;
            let result = logins.get(login_key.as_str())?.map(|v| v.value().to_string());
            result
        };
        if owner.as_deref().is_some_and(|id| id != principal.id) {
            write_txn.abort()?;
            return Ok(false);
        }

        let previous: Option<Principal> = {
            let table = write_txn.open_table(PRINCIPALS)?;
            let result = match table.get(principal.id.as_str())? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        {
            let mut logins = write_txn.open_table(PRINCIPAL_LOGINS)?;
            if let Some(previous) = previous {
                let previous_key = previous.login_key();
                if previous_key != login_key {
                    logins.remove(previous_key.as_str())?;
                }
            }
            logins.insert(login_key.as_str(), principal.id.as_str())?;
        }

        {
            let mut table = write_txn.open_table(PRINCIPALS)?;
            let data = rmp_serde::to_vec_named(principal)?;
            table.insert(principal.id.as_str(), data.as_slice())?;
        }

        write_txn.commit()?;
        Ok(true)
    }

    fn get_principal_txn(&self, id: &str) -> Result<Option<Principal>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PRINCIPALS)?;

        let result = match table.get(id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        Ok(result)
    }

    fn find_principal_by_login_txn(
        &self,
        login_key: &str,
    ) -> Result<Option<Principal>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let logins = read_txn.open_table(PRINCIPAL_LOGINS)?;
        let table = read_txn.open_table(PRINCIPALS)?;

        let id = match logins.get(login_key)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let result = match table.get(id.as_str())? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        Ok(result)
    }
}

impl PrincipalStore for Database {
    fn put_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        if self.put_principal_txn(principal)? {
            Ok(())
        } else {
            Err(StoreError::DuplicateIdentifier)
        }
    }

    fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.get_principal_txn(id)?)
    }

    fn find_principal_by_login(&self, login_key: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.find_principal_by_login_txn(login_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{tenant_login_key, Role};
    use crate::testutil::{make_principal, setup_db};

    #[test]
    fn test_put_and_find_principal() {
        let (db, _temp) = setup_db();
        let alice = make_principal("alice@school.test", Role::Teacher, Some(42));
        db.put_principal(&alice).unwrap();

        let found = db
            .find_principal_by_login(&tenant_login_key(42, "alice@school.test"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, alice.id);
        assert!(db
            .find_principal_by_login(&tenant_login_key(7, "alice@school.test"))
            .unwrap()
            .is_none());
        assert_eq!(db.get_principal(&alice.id).unwrap().unwrap(), alice);
    }

    #[test]
    fn test_same_identifier_in_two_tenants() {
        let (db, _temp) = setup_db();
        db.put_principal(&make_principal("sam@school.test", Role::Student, Some(1)))
            .unwrap();
        db.put_principal(&make_principal("sam@school.test", Role::Parent, Some(2)))
            .unwrap();

        let in_two = db
            .find_principal_by_login(&tenant_login_key(2, "sam@school.test"))
            .unwrap()
            .unwrap();
        assert_eq!(in_two.role, Role::Parent);
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let (db, _temp) = setup_db();
        db.put_principal(&make_principal("bob@school.test", Role::Staff, Some(3)))
            .unwrap();
        let clash = make_principal("bob@school.test", Role::Admin, Some(3));
        assert!(matches!(
            db.put_principal(&clash),
            Err(StoreError::DuplicateIdentifier)
        ));
    }

    #[test]
    fn test_update_moves_login_key() {
        let (db, _temp) = setup_db();
        let mut carol = make_principal("carol@school.test", Role::Teacher, Some(5));
        db.put_principal(&carol).unwrap();

        carol.tenant_id = Some(6);
        carol.role = Role::Admin;
        db.put_principal(&carol).unwrap();

        assert!(db
            .find_principal_by_login(&tenant_login_key(5, "carol@school.test"))
            .unwrap()
            .is_none());
        let moved = db
            .find_principal_by_login(&tenant_login_key(6, "carol@school.test"))
            .unwrap()
            .unwrap();
        assert_eq!(moved.role, Role::Admin);
    }
}
