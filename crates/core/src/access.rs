//! Role-based access control.
//!
//! Every operation that reads or changes tracker data runs on behalf of an [`Actor`] and checks
//! a [`Permission`] first. Roles map to fixed permission sets; there is no per-user override.

use crate::error::{CoreError, CoreResult};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role assigned to a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Self-registered and waiting for an administrator. No access at all.
    Pending,
    /// Read-only access to requisitions.
    Viewer,
    /// Front-desk staff registering requisitions for a unit.
    Registrar,
    /// Regulation staff scheduling and closing requisitions.
    Scheduler,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewRequisitions,
    CreateRequisitions,
    TransitionRequisitions,
    ManageCatalog,
    ManageUsers,
    UploadFiles,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Pending,
        Role::Viewer,
        Role::Registrar,
        Role::Scheduler,
        Role::Admin,
    ];

    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Pending => &[],
            Role::Viewer => &[ViewRequisitions],
            Role::Registrar => &[ViewRequisitions, CreateRequisitions, UploadFiles],
            Role::Scheduler => &[ViewRequisitions, TransitionRequisitions, UploadFiles],
            Role::Admin => &[
                ViewRequisitions,
                CreateRequisitions,
                TransitionRequisitions,
                ManageCatalog,
                ManageUsers,
                UploadFiles,
            ],
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Whether a user with this role and a unit binding only sees that unit's requisitions.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(self, Role::Viewer | Role::Registrar)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pending => "pending",
            Role::Viewer => "viewer",
            Role::Registrar => "registrar",
            Role::Scheduler => "scheduler",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| CoreError::field("role", format!("unknown role '{}'", s)))
    }
}

/// The authenticated user an operation runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: RecordId,
    pub role: Role,
    pub unit_id: Option<RecordId>,
}

impl Actor {
    pub fn require(&self, permission: Permission) -> CoreResult<()> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "role '{}' does not allow {:?}",
                self.role, permission
            )))
        }
    }

    /// The unit this actor is confined to, if any.
    pub fn unit_scope(&self) -> Option<RecordId> {
        if self.role.is_unit_scoped() {
            self.unit_id
        } else {
            None
        }
    }

    pub fn can_see_unit(&self, unit_id: &RecordId) -> bool {
        self.unit_scope().map_or(true, |scope| &scope == unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, unit_id: Option<RecordId>) -> Actor {
        Actor {
            user_id: RecordId::new(),
            role,
            unit_id,
        }
    }

    #[test]
    fn pending_has_no_permissions() {
        let pending = actor(Role::Pending, None);
        assert!(matches!(
            pending.require(Permission::ViewRequisitions),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn role_permission_sets() {
        assert!(Role::Registrar.allows(Permission::CreateRequisitions));
        assert!(!Role::Registrar.allows(Permission::TransitionRequisitions));
        assert!(Role::Scheduler.allows(Permission::TransitionRequisitions));
        assert!(!Role::Scheduler.allows(Permission::CreateRequisitions));
        assert!(!Role::Viewer.allows(Permission::UploadFiles));
        assert!(!Role::Scheduler.allows(Permission::ManageCatalog));
        for permission in Role::Admin.permissions() {
            assert!(Role::Admin.allows(*permission));
        }
    }

    #[test]
    fn unit_scope_applies_to_registrars_only_when_bound() {
        let unit = RecordId::new();
        let other = RecordId::new();

        let bound = actor(Role::Registrar, Some(unit));
        assert!(bound.can_see_unit(&unit));
        assert!(!bound.can_see_unit(&other));

        let unbound = actor(Role::Registrar, None);
        assert!(unbound.can_see_unit(&other));

        let scheduler = actor(Role::Scheduler, Some(unit));
        assert!(scheduler.can_see_unit(&other));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Scheduler".parse::<Role>().unwrap(), Role::Scheduler);
        assert!("root".parse::<Role>().is_err());
    }
}
