//! Role-based authorization.
//!
//! Handlers never compare role strings. They name the capabilities an
//! operation needs and call [`authorize`].

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::storage::models::{PrincipalClass, Role};
use crate::tokens::issuer::PrincipalClaims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    ManageAssignments,
    ManageClasses,
    ManageFinance,
    ManagePrincipals,
    ManageStaff,
    ManageStudents,
    ManageTenants,
    ManageTransport,
    RecordAttendance,
    ViewAssignments,
    ViewOwnRecords,
}

use Capability::*;

const ALL: &[Capability] = &[
    ManageAssignments,
    ManageClasses,
    ManageFinance,
    ManagePrincipals,
    ManageStaff,
    ManageStudents,
    ManageTenants,
    ManageTransport,
    RecordAttendance,
    ViewAssignments,
    ViewOwnRecords,
];

/// Capabilities granted to each role
pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::SuperAdmin => ALL,
        Role::Admin => &[
            ManageAssignments,
            ManageClasses,
            ManageFinance,
            ManagePrincipals,
            ManageStaff,
            ManageStudents,
            ManageTransport,
            RecordAttendance,
            ViewAssignments,
            ViewOwnRecords,
        ],
        Role::Teacher => &[
            ManageAssignments,
            ManageClasses,
            RecordAttendance,
            ViewAssignments,
            ViewOwnRecords,
        ],
        Role::Staff => &[
            ManageStudents,
            ManageTransport,
            RecordAttendance,
            ViewOwnRecords,
        ],
        Role::Accountant => &[ManageFinance, ViewOwnRecords],
        Role::Student | Role::Parent => &[ViewAssignments, ViewOwnRecords],
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}

/// The single authorization decision: every `required` capability must be
/// granted to the principal's role.
pub fn authorize(principal: &PrincipalClaims, required: &[Capability]) -> Result<(), AuthError> {
    match required
        .iter()
        .find(|c| !has_capability(principal.role, **c))
    {
        None => Ok(()),
        Some(missing) => {
            tracing::debug!(
                principal_id = %principal.principal_id,
                role = %principal.role,
                capability = ?missing,
                "Authorization denied"
            );
            Err(AuthError::forbidden(format!(
                "Role {} lacks {missing:?}",
                principal.role
            )))
        }
    }
}

/// Super-admins act in any tenant; everyone else only in their own.
pub fn ensure_tenant(principal: &PrincipalClaims, tenant_id: u64) -> Result<(), AuthError> {
    if principal.class == PrincipalClass::SuperAdmin || principal.tenant_id == Some(tenant_id) {
        Ok(())
    } else {
        Err(AuthError::forbidden("Tenant is outside the caller's scope"))
    }
}

/// Only super-admins may grant administrative roles.
pub fn ensure_can_assign(principal: &PrincipalClaims, role: Role) -> Result<(), AuthError> {
    match role {
        Role::SuperAdmin | Role::Admin if principal.class != PrincipalClass::SuperAdmin => Err(
            AuthError::forbidden(format!("Only a super-admin can create {role} principals")),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, tenant_id: Option<u64>) -> PrincipalClaims {
        PrincipalClaims {
            class: if role == Role::SuperAdmin {
                PrincipalClass::SuperAdmin
            } else {
                PrincipalClass::User
            },
            principal_id: "p1".to_string(),
            role,
            tenant_id,
        }
    }

    #[test]
    fn test_teacher_can_record_attendance_but_not_manage_finance() {
        let teacher = claims(Role::Teacher, Some(42));
        assert!(authorize(&teacher, &[RecordAttendance, ViewAssignments]).is_ok());

        let err = authorize(&teacher, &[RecordAttendance, ManageFinance]).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_only_super_admin_manages_tenants() {
        assert!(authorize(&claims(Role::SuperAdmin, None), &[ManageTenants]).is_ok());
        assert!(authorize(&claims(Role::Admin, Some(1)), &[ManageTenants]).is_err());
    }

    #[test]
    fn test_empty_requirement_always_passes() {
        assert!(authorize(&claims(Role::Parent, Some(1)), &[]).is_ok());
    }

    #[test]
    fn test_tenant_guard() {
        assert!(ensure_tenant(&claims(Role::Admin, Some(42)), 42).is_ok());
        assert!(ensure_tenant(&claims(Role::Admin, Some(42)), 7).is_err());
        assert!(ensure_tenant(&claims(Role::SuperAdmin, None), 7).is_ok());
    }

    #[test]
    fn test_role_assignment() {
        let admin = claims(Role::Admin, Some(42));
        assert!(ensure_can_assign(&admin, Role::Teacher).is_ok());
        assert!(ensure_can_assign(&admin, Role::Admin).is_err());
        assert!(ensure_can_assign(&claims(Role::SuperAdmin, None), Role::Admin).is_ok());
    }
}
