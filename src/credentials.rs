//! Credential verification and password hashing.
//!
//! Every failure to authenticate (unknown identifier, wrong tenant, no
//! password, wrong password, disabled account) is reported as the same
//! `InvalidCredentials`. Unknown identifiers are still checked against a
//! dummy hash so response time does not reveal which accounts exist.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PasswordConfig;
use crate::storage::models::{super_admin_login_key, tenant_login_key, Principal};
use crate::storage::{PrincipalStore, StoreError};
use crate::tokens::generator::generate_hex;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("identifier is required")]
    MissingIdentifier,
    #[error("Principal store error: {0}")]
    Store(#[from] StoreError),
}

/// Argon2id hashing with configurable cost
#[derive(Clone)]
pub struct PasswordHashing {
    argon2: Argon2<'static>,
}

impl PasswordHashing {
    pub fn new(config: &PasswordConfig) -> Result<Self, CredentialError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC string
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let phc = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Check a password against a PHC string. The digest comparison is
    /// constant-time; cost parameters come from the PHC string itself.
    pub fn verify(&self, phc: &str, password: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Trim and lowercase a login identifier (email)
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

pub struct CredentialVerifier {
    dummy_hash: String,
    hashing: PasswordHashing,
    principals: Arc<dyn PrincipalStore>,
}

impl CredentialVerifier {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        hashing: PasswordHashing,
    ) -> Result<Self, CredentialError> {
        let dummy_hash = hashing.hash(&generate_hex(16))?;
        Ok(Self {
            dummy_hash,
            hashing,
            principals,
        })
    }

    pub fn hashing(&self) -> &PasswordHashing {
        &self.hashing
    }

    /// Check an identifier/password pair within an optional tenant scope.
    ///
    /// Tenant users are found only under the tenant they belong to. A
    /// super-admin is found with or without a tenant scope. The returned
    /// principal has its password hash stripped.
    pub fn verify(
        &self,
        identifier: &str,
        tenant_scope: Option<u64>,
        password: &str,
    ) -> Result<Principal, CredentialError> {
        let identifier = normalize_identifier(identifier);
        if identifier.is_empty() {
            return Err(CredentialError::MissingIdentifier);
        }

        let principal = self.find(&identifier, tenant_scope)?;

        let stored_hash = principal
            .as_ref()
            .filter(|p| p.active)
            .and_then(|p| p.password_hash.as_deref());

        let matched = match stored_hash {
            Some(hash) => self.hashing.verify(hash, password),
            None => {
                // Burn the same work as a real comparison
                let _ = self.hashing.verify(&self.dummy_hash, password);
                false
            }
        };

        match principal {
            Some(mut principal) if matched => {
                principal.password_hash = None;
                Ok(principal)
            }
            _ => {
                tracing::debug!(tenant_id = ?tenant_scope, "Credential check failed");
                Err(CredentialError::InvalidCredentials)
            }
        }
    }

    fn find(
        &self,
        identifier: &str,
        tenant_scope: Option<u64>,
    ) -> Result<Option<Principal>, CredentialError> {
        if let Some(tenant_id) = tenant_scope {
            let key = tenant_login_key(tenant_id, identifier);
            if let Some(principal) = self.principals.find_principal_by_login(&key)? {
                return Ok(Some(principal));
            }
        }
        Ok(self
            .principals
            .find_principal_by_login(&super_admin_login_key(identifier))?)
    }
}
