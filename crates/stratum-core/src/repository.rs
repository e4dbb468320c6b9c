//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Directory repositories act on the
//! central directory database. Tenant repositories are obtained from a
//! [`Scoped`](crate::scope::Scoped) handle and carry their scope with them,
//! so callers never pass a tenant id to individual queries.

use chrono::{DateTime, Utc};

use crate::error::StratumResult;
use crate::models::{
    global_identity::{CreateGlobalIdentity, GlobalIdentity},
    module::{CreateModule, Module},
    permission::{CreatePermission, Permission},
    plan::{CreatePlan, Plan, PlanType},
    role::{CreateRole, Role},
    tenant::{CreateTenant, Tenant, TenantWithPlan, UpdateTenant},
    user::{CreateUser, UpdateUser, User},
};
use crate::scope::Scope;

// ---------------------------------------------------------------------------
// Directory (global scope)
// ---------------------------------------------------------------------------

pub trait PlanRepository: Send + Sync {
    fn create(&self, input: CreatePlan) -> impl Future<Output = StratumResult<Plan>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = StratumResult<Plan>> + Send;
    fn get_by_type(
        &self,
        plan_type: PlanType,
    ) -> impl Future<Output = StratumResult<Vec<Plan>>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<Plan>>> + Send;
}

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = StratumResult<Tenant>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = StratumResult<Tenant>> + Send;
    /// Tenant with its plan preloaded. Every read that leads to routing uses this.
    fn get_with_plan(&self, id: u64)
    -> impl Future<Output = StratumResult<TenantWithPlan>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = StratumResult<Tenant>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<Tenant>>> + Send;
    fn update(
        &self,
        id: u64,
        input: UpdateTenant,
    ) -> impl Future<Output = StratumResult<Tenant>> + Send;
    fn set_active(&self, id: u64, active: bool)
    -> impl Future<Output = StratumResult<Tenant>> + Send;
    /// Hard delete. Only used to roll back a failed provisioning.
    fn delete(&self, id: u64) -> impl Future<Output = StratumResult<()>> + Send;
}

pub trait GlobalIdentityRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is already indexed.
    fn create(
        &self,
        input: CreateGlobalIdentity,
    ) -> impl Future<Output = StratumResult<GlobalIdentity>> + Send;
    /// `NotFound` is an expected outcome here, not a failure worth logging.
    fn get_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = StratumResult<GlobalIdentity>> + Send;
    /// Drop the entry for `email` if it points at `tenant_id`. Returns
    /// whether a row was removed.
    fn delete(
        &self,
        email: &str,
        tenant_id: u64,
    ) -> impl Future<Output = StratumResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// Catalog (unscoped, present in every database)
// ---------------------------------------------------------------------------

pub trait ModuleRepository: Send + Sync {
    fn create(&self, input: CreateModule) -> impl Future<Output = StratumResult<Module>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = StratumResult<Module>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<Module>>> + Send;
}

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = StratumResult<Permission>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = StratumResult<Permission>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = StratumResult<Permission>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<Permission>>> + Send;
    fn list_by_categories(
        &self,
        categories: &[&str],
    ) -> impl Future<Output = StratumResult<Vec<Permission>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-scoped repositories
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = StratumResult<Role>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = StratumResult<Role>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = StratumResult<Role>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<Role>>> + Send;

    /// Replace the role's permission set.
    fn set_permissions(
        &self,
        role_id: u64,
        permission_ids: &[u64],
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn grant_permission(
        &self,
        role_id: u64,
        permission_id: u64,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn revoke_permission(
        &self,
        role_id: u64,
        permission_id: u64,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn get_role_permissions(
        &self,
        role_id: u64,
    ) -> impl Future<Output = StratumResult<Vec<Permission>>> + Send;

    /// Fails with `AlreadyExists` when the user already holds the role.
    fn assign_to_user(
        &self,
        user_id: u64,
        role_id: u64,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn unassign_from_user(
        &self,
        user_id: u64,
        role_id: u64,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn get_user_roles(&self, user_id: u64)
    -> impl Future<Output = StratumResult<Vec<Role>>> + Send;

    /// Distinct permission names held by the user through all of its roles.
    fn user_permission_names(
        &self,
        user_id: u64,
    ) -> impl Future<Output = StratumResult<Vec<String>>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = StratumResult<User>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = StratumResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = StratumResult<User>> + Send;
    fn get_by_username(&self, username: &str)
    -> impl Future<Output = StratumResult<User>> + Send;
    /// Match by email or username.
    fn get_by_login(&self, identifier: &str)
    -> impl Future<Output = StratumResult<User>> + Send;
    fn get_by_api_key_hash(
        &self,
        key_hash: &str,
    ) -> impl Future<Output = StratumResult<User>> + Send;
    fn update(&self, id: u64, input: UpdateUser)
    -> impl Future<Output = StratumResult<User>> + Send;
    /// Overwrite the stored API key digest and expiry.
    fn set_api_key(
        &self,
        id: u64,
        key_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    /// Clear whichever user holds `key_hash`. Returns whether a row changed.
    fn clear_api_key(&self, key_hash: &str) -> impl Future<Output = StratumResult<bool>> + Send;
    fn delete(&self, id: u64) -> impl Future<Output = StratumResult<()>> + Send;
    fn count(&self) -> impl Future<Output = StratumResult<u64>> + Send;
    fn list(&self) -> impl Future<Output = StratumResult<Vec<User>>> + Send;
}

// ---------------------------------------------------------------------------
// Repository factories
// ---------------------------------------------------------------------------

/// A database handle able to hand out repositories for one physical database.
pub trait TenantStore: Clone + Send + Sync + 'static {
    type Users: UserRepository;
    type Roles: RoleRepository;
    type Permissions: PermissionRepository;
    type Modules: ModuleRepository;

    fn users(&self, scope: Scope) -> Self::Users;
    fn roles(&self, scope: Scope) -> Self::Roles;
    fn permissions(&self) -> Self::Permissions;
    fn modules(&self) -> Self::Modules;
}

/// The directory database additionally holds plans, tenants and identities.
pub trait DirectoryStore: TenantStore {
    type Plans: PlanRepository;
    type Tenants: TenantRepository;
    type Identities: GlobalIdentityRepository;

    fn plans(&self) -> Self::Plans;
    fn tenants(&self) -> Self::Tenants;
    fn identities(&self) -> Self::Identities;
}
