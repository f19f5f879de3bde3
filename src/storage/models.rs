use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device kind detected from User-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    Bot,
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Information about the device that opened a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub kind: DeviceKind,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub raw_user_agent: String,
}

/// Client details captured when a session is opened or rotated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientMetadata {
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
}

/// Which population a principal belongs to.
///
/// Super-admins are not bound to a tenant and bypass tenant scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalClass {
    SuperAdmin,
    User,
}

/// Closed set of roles a principal can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Staff,
    Accountant,
    Student,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Staff => "STAFF",
            Role::Accountant => "ACCOUNTANT",
            Role::Student => "STUDENT",
            Role::Parent => "PARENT",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity capable of authenticating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub active: bool,
    pub class: PrincipalClass,
    pub created_at: DateTime<Utc>,
    pub display_name: String,
    /// Unique per tenant for users, globally for super-admins (normalised email)
    pub identifier: String,
    pub id: String,
    /// Argon2 PHC string. Never leaves the credential verifier.
    pub password_hash: Option<String>,
    pub role: Role,
    /// School the principal belongs to. `None` only for super-admins.
    pub tenant_id: Option<u64>,
}

impl Principal {
    /// Key under which the principal is found at login.
    pub fn login_key(&self) -> String {
        match self.class {
            PrincipalClass::SuperAdmin => super_admin_login_key(&self.identifier),
            PrincipalClass::User => {
                tenant_login_key(self.tenant_id.unwrap_or_default(), &self.identifier)
            }
        }
    }
}

pub fn tenant_login_key(tenant_id: u64, identifier: &str) -> String {
    format!("{tenant_id}:{identifier}")
}

pub fn super_admin_login_key(identifier: &str) -> String {
    format!("*:{identifier}")
}

/// Server-side record of an outstanding refresh token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub class: PrincipalClass,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Public session identifier (the refresh token's `jti`)
    pub id: String,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub metadata: ClientMetadata,
    pub principal_id: String,
    /// Session id of the successor, set when this record was rotated
    pub replaced_by: Option<String>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub tenant_id: Option<u64>,
    /// SHA-256 hex of the refresh token value. The value itself is never stored.
    pub token_hash: String,
}

/// Lifecycle position of a session record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
    Rotated,
}

impl SessionRecord {
    /// A record is valid strictly before its expiry instant.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        match (self.revoked, self.replaced_by.is_some()) {
            (true, true) => SessionStatus::Rotated,
            (true, false) => SessionStatus::Revoked,
            _ if self.expires_at <= now => SessionStatus::Expired,
            _ => SessionStatus::Active,
        }
    }

    pub(crate) fn mark_revoked(&mut self, now: DateTime<Utc>, replaced_by: Option<String>) {
        self.revoked = true;
        self.revoked_at = Some(now);
        self.replaced_by = replaced_by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_record;

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let mut record = make_record("s1", "user-1");
        record.expires_at = now;
        assert!(!record.is_active_at(now));
        assert!(record.is_active_at(now - chrono::Duration::milliseconds(1)));
        assert_eq!(record.status_at(now), SessionStatus::Expired);
    }

    #[test]
    fn test_status_distinguishes_rotation_from_revocation() {
        let now = Utc::now();
        let mut rotated = make_record("s1", "user-1");
        rotated.mark_revoked(now, Some("s2".to_string()));
        assert_eq!(rotated.status_at(now), SessionStatus::Rotated);

        let mut revoked = make_record("s3", "user-1");
        revoked.mark_revoked(now, None);
        assert_eq!(revoked.status_at(now), SessionStatus::Revoked);
        assert_eq!(revoked.revoked_at, Some(now));
    }

    #[test]
    fn test_role_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"SUPER_ADMIN\"");
        assert_eq!(Role::Teacher.to_string(), "TEACHER");
    }
}
