pub mod generator;
pub mod issuer;
pub mod ledger;

pub use generator::{generate_hex, generate_session_id, hash_token};
