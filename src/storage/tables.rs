use redb::TableDefinition;

/// Principals: principal_id -> Principal (msgpack)
pub const PRINCIPALS: TableDefinition<&str, &[u8]> = TableDefinition::new("principals");

/// Login index: "{tenant}:{identifier}" or "*:{identifier}" -> principal_id
pub const PRINCIPAL_LOGINS: TableDefinition<&str, &str> = TableDefinition::new("principal_logins");

/// Session records: token_hash -> SessionRecord (msgpack)
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Secondary index: session_id -> token_hash
pub const SESSION_IDS: TableDefinition<&str, &str> = TableDefinition::new("session_ids");

/// Secondary index: principal_id -> Vec<token_hash> (msgpack)
pub const SUBJECT_SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("subject_sessions");

/// Expiration index: "{expires_ms:020}:{token_hash}" -> token_hash
pub const SESSION_EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("session_expiry");
