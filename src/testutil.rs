//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use crate::clock::Clock;
use crate::config::{Config, CookieConfig, NodeConfig, PasswordConfig, TokenConfig};
use crate::credentials::PasswordHashing;
use crate::storage::models::{
    ClientMetadata, Principal, PrincipalClass, Role, SessionRecord,
};
use crate::storage::Database;
use crate::tokens::generator::hash_token;
use crate::AppState;

pub const ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

pub fn test_token_config() -> TokenConfig {
    TokenConfig {
        access_secret: ACCESS_SECRET.to_string(),
        access_ttl_seconds: 900,
        cleanup_interval_seconds: 60,
        issuer: "school-auth-test".to_string(),
        refresh_secret: REFRESH_SECRET.to_string(),
        refresh_ttl_seconds: 604_800,
    }
}

/// Argon2 parameters cheap enough for unit tests
pub fn test_password_config() -> PasswordConfig {
    PasswordConfig {
        iterations: 1,
        memory_kib: 64,
        parallelism: 1,
    }
}

pub fn test_password_hashing() -> PasswordHashing {
    PasswordHashing::new(&test_password_config()).unwrap()
}

/// A minimal `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        bootstrap: None,
        cookies: CookieConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        passwords: test_password_config(),
        test_mode: false,
        tokens: test_token_config(),
    }
}

/// Build a full `Arc<AppState>` around the given database and clock.
pub fn test_state(db: Database, config: Config, clock: Arc<dyn Clock>) -> Arc<AppState> {
    Arc::new(AppState::new(config, db, clock).unwrap())
}

/// Tenant user with a fresh id and no password.
pub fn make_principal(identifier: &str, role: Role, tenant_id: Option<u64>) -> Principal {
    Principal {
        active: true,
        class: PrincipalClass::User,
        created_at: Utc::now(),
        display_name: identifier.to_string(),
        identifier: identifier.to_string(),
        id: uuid::Uuid::new_v4().to_string(),
        password_hash: None,
        role,
        tenant_id,
    }
}

pub fn make_super_admin(identifier: &str) -> Principal {
    Principal {
        class: PrincipalClass::SuperAdmin,
        tenant_id: None,
        ..make_principal(identifier, Role::SuperAdmin, None)
    }
}

/// Create a live `SessionRecord` whose refresh token is `tok_{id}`.
pub fn make_record(id: &str, subject: &str) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        class: PrincipalClass::User,
        created_at: now,
        expires_at: now + chrono::Duration::hours(24),
        id: id.to_string(),
        last_rotated_at: None,
        metadata: ClientMetadata::default(),
        principal_id: subject.to_string(),
        replaced_by: None,
        revoked: false,
        revoked_at: None,
        tenant_id: Some(42),
        token_hash: hash_token(&format!("tok_{id}")),
    }
}
