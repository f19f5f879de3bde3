//! school-auth - session and token lifecycle for a multi-tenant school admin app
//!
//! This crate provides:
//! - Argon2id credential verification with tenant scoping
//! - Short-lived access tokens and rotating refresh tokens (HS256, one secret per class)
//! - A session ledger with atomic refresh-token rotation and revocation
//! - Role/capability authorization
//! - Active expiration via a background task
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - REST API

pub mod api;
pub mod authz;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod expiration;
pub mod protocol;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use clock::Clock;
use config::Config;
use error::AuthError;
use protocol::SessionProtocol;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub protocol: SessionProtocol,
}

impl AppState {
    pub fn new(config: Config, db: Database, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let store = Arc::new(db);
        let protocol = SessionProtocol::new(&config, store.clone(), store, clock)?;
        Ok(Self { config, protocol })
    }
}
