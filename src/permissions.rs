use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::RoleGrant,
    repository::Repository,
};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_LECTURER: &str = "lecturer";
pub const ROLE_STUDENT: &str = "student";

// Permission strings granted through `role_permissions`.
pub const USERS_READ: &str = "users.read";
pub const USERS_CREATE: &str = "users.create";
pub const USERS_UPDATE: &str = "users.update";
pub const USERS_DELETE: &str = "users.delete";
pub const USERS_MANAGE_ROLES: &str = "users.manage_roles";
pub const STUDENTS_READ: &str = "students.read";
pub const STUDENTS_MANAGE: &str = "students.manage";
pub const LECTURERS_READ: &str = "lecturers.read";
pub const LECTURERS_MANAGE: &str = "lecturers.manage";
pub const ACHIEVEMENTS_CREATE: &str = "achievements.create";
pub const ACHIEVEMENTS_READ: &str = "achievements.read";
pub const ACHIEVEMENTS_UPDATE: &str = "achievements.update";
pub const ACHIEVEMENTS_DELETE: &str = "achievements.delete";
pub const ACHIEVEMENTS_SUBMIT: &str = "achievements.submit";
pub const ACHIEVEMENTS_VERIFY: &str = "achievements.verify";
pub const REPORTS_READ: &str = "reports.read";

#[derive(Debug, Clone, Default)]
struct RoleEntry {
    name: String,
    permissions: BTreeSet<String>,
}

/// PermissionCache
///
/// Role → permission lookup, built once at startup from `roles` × `role_permissions` ×
/// `permissions` and never mutated afterwards. It lives in `AppState` behind an `Arc`,
/// so every request evaluates against the same snapshot without touching the database.
/// Role or grant changes take effect on restart.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    roles: HashMap<Uuid, RoleEntry>,
}

/// PermissionState
///
/// The shared, read-only permission cache held in the application state.
pub type PermissionState = Arc<PermissionCache>;

impl PermissionCache {
    /// load
    ///
    /// Reads every role and its grants from the relational store.
    pub async fn load(repo: &dyn Repository) -> AppResult<Self> {
        let grants = repo.role_grants().await?;
        let cache = Self::from_grants(grants);
        tracing::info!(roles = cache.roles.len(), "permission cache loaded");
        Ok(cache)
    }

    /// Builds the cache from raw grant rows. A role with no permissions arrives as a single
    /// row whose `permission` is `None`.
    pub fn from_grants(grants: impl IntoIterator<Item = RoleGrant>) -> Self {
        let mut roles: HashMap<Uuid, RoleEntry> = HashMap::new();
        for grant in grants {
            let entry = roles.entry(grant.role_id).or_insert_with(|| RoleEntry {
                name: grant.role_name.clone(),
                permissions: BTreeSet::new(),
            });
            if let Some(permission) = grant.permission {
                entry.permissions.insert(permission);
            }
        }
        Self { roles }
    }

    pub fn role_name(&self, role_id: Uuid) -> Option<&str> {
        self.roles.get(&role_id).map(|entry| entry.name.as_str())
    }

    /// Sorted permission names for a role; empty for an unknown role.
    pub fn permissions_for(&self, role_id: Uuid) -> Vec<String> {
        self.roles
            .get(&role_id)
            .map(|entry| entry.permissions.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_permission(&self, role_id: Uuid, permission: &str) -> bool {
        self.roles
            .get(&role_id)
            .is_some_and(|entry| entry.permissions.contains(permission))
    }

    /// Denies with 403 naming the missing permission.
    pub fn require(&self, role_id: Uuid, permission: &str) -> AppResult<()> {
        if self.has_permission(role_id, permission) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "missing permission: {permission}"
            )))
        }
    }

    pub fn require_any(&self, role_id: Uuid, permissions: &[&str]) -> AppResult<()> {
        if permissions.iter().any(|p| self.has_permission(role_id, p)) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "requires one of: {}",
                permissions.join(", ")
            )))
        }
    }

    pub fn require_all(&self, role_id: Uuid, permissions: &[&str]) -> AppResult<()> {
        for permission in permissions {
            self.require(role_id, permission)?;
        }
        Ok(())
    }
}
