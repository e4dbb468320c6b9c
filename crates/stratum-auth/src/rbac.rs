//! Role management within a tenant.
//!
//! System roles ("Super Administrator", "Tenant Admin") are read-only
//! through this service. Every mutation invalidates the affected
//! permission cache entries.

use serde::Serialize;
use stratum_core::cache::KeyValueCache;
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::permission::Permission;
use stratum_core::models::role::{CreateRole, Role};
use stratum_core::repository::{PermissionRepository, RoleRepository, TenantStore};
use stratum_core::scope::Scoped;
use tracing::info;

use crate::permission::PermissionCache;

#[derive(Debug, Clone, Serialize)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

pub struct RbacService<K> {
    permissions: PermissionCache<K>,
}

impl<K: KeyValueCache + Clone> RbacService<K> {
    pub fn new(permissions: PermissionCache<K>) -> Self {
        Self { permissions }
    }

    /// Create a custom role. Custom roles are never system roles.
    pub async fn create_role<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        name: &str,
        description: &str,
    ) -> StratumResult<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StratumError::validation("role name cannot be empty"));
        }
        let role = db
            .roles()
            .create(CreateRole {
                name: name.into(),
                description: description.trim().into(),
                is_system: false,
            })
            .await?;
        info!(tenant_id = db.tenant_id(), role_id = role.id, "role created");
        Ok(role)
    }

    pub async fn list_roles<H: TenantStore>(&self, db: &Scoped<H>) -> StratumResult<Vec<Role>> {
        db.roles().list().await
    }

    pub async fn get_role<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        role_id: u64,
    ) -> StratumResult<RoleWithPermissions> {
        let roles = db.roles();
        let role = roles.get_by_id(role_id).await?;
        let permissions = roles.get_role_permissions(role_id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Replace the permission set of a custom role.
    pub async fn set_role_permissions<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        role_id: u64,
        permission_ids: &[u64],
    ) -> StratumResult<()> {
        self.editable_role(db, role_id).await?;
        let catalog = db.permissions();
        for id in permission_ids {
            catalog.get_by_id(*id).await?;
        }
        db.roles().set_permissions(role_id, permission_ids).await?;
        self.permissions.invalidate_tenant(db.tenant_id()).await;
        info!(
            tenant_id = db.tenant_id(),
            role_id,
            count = permission_ids.len(),
            "role permissions replaced"
        );
        Ok(())
    }

    pub async fn grant_permission<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        role_id: u64,
        permission_id: u64,
    ) -> StratumResult<()> {
        self.editable_role(db, role_id).await?;
        db.permissions().get_by_id(permission_id).await?;
        db.roles().grant_permission(role_id, permission_id).await?;
        self.permissions.invalidate_tenant(db.tenant_id()).await;
        Ok(())
    }

    pub async fn revoke_permission<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        role_id: u64,
        permission_id: u64,
    ) -> StratumResult<()> {
        self.editable_role(db, role_id).await?;
        db.roles().revoke_permission(role_id, permission_id).await?;
        self.permissions.invalidate_tenant(db.tenant_id()).await;
        Ok(())
    }

    /// Give `user_id` the role. Fails with `AlreadyExists` if already held.
    pub async fn assign_role<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
        role_id: u64,
    ) -> StratumResult<()> {
        db.roles().assign_to_user(user_id, role_id).await?;
        self.permissions
            .invalidate_user(db.tenant_id(), user_id)
            .await;
        Ok(())
    }

    pub async fn remove_role<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
        role_id: u64,
    ) -> StratumResult<()> {
        db.roles().unassign_from_user(user_id, role_id).await?;
        self.permissions
            .invalidate_user(db.tenant_id(), user_id)
            .await;
        Ok(())
    }

    async fn editable_role<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        role_id: u64,
    ) -> StratumResult<Role> {
        let role = db.roles().get_by_id(role_id).await?;
        if role.is_system {
            return Err(StratumError::forbidden(format!(
                "system role '{}' cannot be modified",
                role.name
            )));
        }
        Ok(role)
    }
}
