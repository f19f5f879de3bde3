pub mod db;
pub mod memory;
pub mod models;
mod principals;
mod sessions;
mod store;
mod tables;

pub use db::{Database, DatabaseError};
pub use memory::MemoryStore;
pub use store::{PrincipalStore, SessionStore, StoreError};
pub use tables::*;
