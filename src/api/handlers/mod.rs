mod admin;
mod auth;
mod principals;
mod sessions;

pub use admin::{admin_purge, health};
pub use auth::{login, logout, logout_all, me, refresh};
pub use principals::create_principal;
pub use sessions::{list_sessions, revoke_session};
