//! Tenant provisioning and administration.
//!
//! Provisioning order: directory record, admin email reserved in the global
//! identity index, physical database, routed connection (schema included),
//! permission catalog copied from the directory, "Tenant Admin" role, admin
//! user. A failure after the record exists removes the identity and the
//! record again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratum_core::cache::KeyValueCache;
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::global_identity::CreateGlobalIdentity;
use stratum_core::models::module::CreateModule;
use stratum_core::models::permission::CreatePermission;
use stratum_core::models::plan::{Plan, PlanType};
use stratum_core::models::role::{CreateRole, Role, TENANT_ADMIN};
use stratum_core::models::tenant::{
    CreateTenant, DatabaseType, Tenant, TenantWithPlan, UpdateTenant, dedicated_database_name,
};
use stratum_core::models::user::{CreateUser, User};
use stratum_core::repository::{
    DirectoryStore, GlobalIdentityRepository, ModuleRepository, PermissionRepository,
    PlanRepository, RoleRepository, TenantRepository, TenantStore, UserRepository,
};
use stratum_core::router::{ConnectionRouter, Connector};
use stratum_core::scope::Scoped;
use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::password;
use crate::validation::{check_email, check_password, check_username};

/// Permission categories granted to every tenant's admin role.
const TENANT_ADMIN_CATEGORIES: &[&str] = &["user", "role"];

pub fn tenant_info_key(tenant_id: u64) -> String {
    format!("tenant_info:{tenant_id}")
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub database_type: DatabaseType,
    /// Defaults to the free plan.
    pub plan_id: Option<u64>,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tenant: TenantWithPlan,
    pub admin_role: Role,
    pub admin: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_connections: usize,
}

pub struct TenantService<C: Connector, K> {
    router: Arc<ConnectionRouter<C>>,
    directory: C::Handle,
    cache: K,
    config: AuthConfig,
}

impl<C, K> TenantService<C, K>
where
    C: Connector,
    C::Handle: DirectoryStore,
    K: KeyValueCache + Clone,
{
    pub fn new(
        router: Arc<ConnectionRouter<C>>,
        directory: C::Handle,
        cache: K,
        config: AuthConfig,
    ) -> Self {
        Self {
            router,
            directory,
            cache,
            config,
        }
    }

    pub async fn create_tenant(&self, req: CreateTenantRequest) -> StratumResult<ProvisionedTenant> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(StratumError::validation("tenant name cannot be empty"));
        }
        let admin_username = req.admin_username.trim();
        let admin_email = req.admin_email.trim().to_lowercase();
        check_username(admin_username)?;
        check_email(&admin_email)?;
        check_password(&req.admin_password, self.config.min_password_length)?;

        let tenants = self.directory.tenants();
        match tenants.get_by_name(name).await {
            Ok(_) => return Err(StratumError::already_exists("tenant")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match self.directory.identities().get_by_email(&admin_email).await {
            Ok(_) => return Err(StratumError::already_exists("global identity")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let plan = self.plan_for(req.plan_id).await?;
        let password_hash =
            password::hash_password(&req.admin_password, self.config.pepper.as_deref())?;

        let database_name = match req.database_type {
            DatabaseType::Dedicated => dedicated_database_name(name),
            DatabaseType::Shared => self.router.config().shared_database.clone(),
        };
        let tenant = tenants
            .create(CreateTenant {
                name: name.into(),
                database_type: req.database_type,
                database_name,
                plan_id: plan.as_ref().map(|p| p.id),
                plan_expires_at: req.plan_expires_at,
            })
            .await?;
        info!(tenant_id = tenant.id, database = %tenant.database_name, "tenant record created");

        // Reserve the admin email before touching any physical database.
        let identity = CreateGlobalIdentity {
            email: admin_email.clone(),
            tenant_id: tenant.id,
        };
        if let Err(e) = self.directory.identities().create(identity).await {
            self.rollback(&tenant, None, &e).await;
            return Err(e);
        }

        let provisioned = self
            .provision_database(&tenant, admin_username, &admin_email, password_hash)
            .await;
        let (admin_role, admin) = match provisioned {
            Ok(done) => done,
            Err(e) => {
                self.rollback(&tenant, Some(&admin_email), &e).await;
                return Err(e);
            }
        };

        info!(tenant_id = tenant.id, admin_id = admin.id, "tenant provisioned");
        Ok(ProvisionedTenant {
            tenant: TenantWithPlan { tenant, plan },
            admin_role,
            admin,
        })
    }

    /// Physical database, catalog, admin role and admin user.
    async fn provision_database(
        &self,
        tenant: &Tenant,
        admin_username: &str,
        admin_email: &str,
        password_hash: String,
    ) -> StratumResult<(Role, User)> {
        let db = self.open_new_database(tenant).await?;
        self.sync_catalog(&db).await?;
        let admin_role = self.ensure_admin_role(&db).await?;

        let users = db.users();
        let admin = users
            .create(CreateUser {
                username: admin_username.into(),
                email: admin_email.into(),
                password_hash,
                is_active: true,
            })
            .await?;
        if let Err(e) = db.roles().assign_to_user(admin.id, admin_role.id).await {
            if let Err(cleanup) = users.delete(admin.id).await {
                error!(tenant_id = tenant.id, error = %cleanup, "admin user cleanup failed");
            }
            return Err(e);
        }
        Ok((admin_role, admin))
    }

    async fn plan_for(&self, plan_id: Option<u64>) -> StratumResult<Option<Plan>> {
        let plans = self.directory.plans();
        match plan_id {
            Some(id) => match plans.get_by_id(id).await {
                Ok(plan) => Ok(Some(plan)),
                Err(e) if e.is_not_found() => Err(StratumError::validation(format!(
                    "plan {id} does not exist"
                ))),
                Err(e) => Err(e),
            },
            None => Ok(plans.get_by_type(PlanType::Free).await?.into_iter().next()),
        }
    }

    async fn open_new_database(&self, tenant: &Tenant) -> StratumResult<Scoped<C::Handle>> {
        match tenant.database_type {
            DatabaseType::Dedicated => self.router.create_dedicated_database(tenant).await?,
            DatabaseType::Shared => self.router.create_shared_database().await?,
        }
        self.router.resolve(tenant).await
    }

    /// Undo the directory side of a failed provisioning. Catalog tables and
    /// roles already created in a dedicated database are reused by a retry.
    async fn rollback(&self, tenant: &Tenant, admin_email: Option<&str>, cause: &StratumError) {
        warn!(tenant_id = tenant.id, error = %cause, "provisioning failed, removing tenant record");
        if let Some(email) = admin_email {
            if let Err(e) = self.directory.identities().delete(email, tenant.id).await {
                error!(tenant_id = tenant.id, error = %e, "identity rollback failed");
            }
        }
        self.router.evict(tenant.id).await;
        if let Err(e) = self.directory.tenants().delete(tenant.id).await {
            error!(tenant_id = tenant.id, error = %e, "tenant rollback failed");
        }
    }

    /// Copy modules and permissions missing from `db` out of the directory.
    async fn sync_catalog(&self, db: &Scoped<C::Handle>) -> StratumResult<()> {
        let modules = db.modules();
        let mut module_ids = HashMap::new();
        for module in self.directory.modules().list().await? {
            let local = match modules.get_by_name(&module.name).await {
                Ok(local) => local,
                Err(e) if e.is_not_found() => {
                    modules
                        .create(CreateModule {
                            name: module.name.clone(),
                            description: module.description.clone(),
                        })
                        .await?
                }
                Err(e) => return Err(e),
            };
            module_ids.insert(module.id, local.id);
        }

        let permissions = db.permissions();
        let mut copied = 0usize;
        for permission in self.directory.permissions().list().await? {
            match permissions.get_by_name(&permission.name).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            let mut input = CreatePermission::from(&permission);
            input.module_id = permission
                .module_id
                .and_then(|id| module_ids.get(&id).copied());
            match permissions.create(input).await {
                // A concurrent provisioning on the shared database got there first.
                Ok(_) | Err(StratumError::AlreadyExists { .. }) => copied += 1,
                Err(e) => return Err(e),
            }
        }
        info!(tenant_id = db.tenant_id(), copied, "permission catalog synced");
        Ok(())
    }

    async fn ensure_admin_role(&self, db: &Scoped<C::Handle>) -> StratumResult<Role> {
        let roles = db.roles();
        let role = match roles.get_by_name(TENANT_ADMIN).await {
            Ok(role) => role,
            Err(e) if e.is_not_found() => {
                roles
                    .create(CreateRole {
                        name: TENANT_ADMIN.into(),
                        description: "Administrator for this workspace".into(),
                        is_system: true,
                    })
                    .await?
            }
            Err(e) => return Err(e),
        };
        let granted: Vec<u64> = db
            .permissions()
            .list_by_categories(TENANT_ADMIN_CATEGORIES)
            .await?
            .iter()
            .map(|p| p.id)
            .collect();
        roles.set_permissions(role.id, &granted).await?;
        Ok(role)
    }

    pub async fn get_tenant(&self, tenant_id: u64) -> StratumResult<TenantWithPlan> {
        self.directory.tenants().get_with_plan(tenant_id).await
    }

    pub async fn list_tenants(&self) -> StratumResult<Vec<Tenant>> {
        self.directory.tenants().list().await
    }

    pub async fn update_tenant(&self, tenant_id: u64, input: UpdateTenant) -> StratumResult<Tenant> {
        let tenant = self.directory.tenants().update(tenant_id, input).await?;
        self.forget_tenant_info(tenant_id).await;
        Ok(tenant)
    }

    /// Mark the tenant inactive. Its cached connection stays open, but
    /// routing and login refuse it from now on.
    pub async fn suspend(&self, tenant_id: u64) -> StratumResult<Tenant> {
        if self.config.is_system_tenant(tenant_id) {
            return Err(StratumError::forbidden("the system tenant cannot be suspended"));
        }
        self.set_active(tenant_id, false).await
    }

    pub async fn activate(&self, tenant_id: u64) -> StratumResult<Tenant> {
        self.set_active(tenant_id, true).await
    }

    async fn set_active(&self, tenant_id: u64, active: bool) -> StratumResult<Tenant> {
        let tenant = self.directory.tenants().set_active(tenant_id, active).await?;
        self.forget_tenant_info(tenant_id).await;
        info!(tenant_id, active, "tenant status changed");
        Ok(tenant)
    }

    async fn forget_tenant_info(&self, tenant_id: u64) {
        let key = tenant_info_key(tenant_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key, error = %e, "tenant info invalidation failed");
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cached_connections: self.router.cached_count().await,
        }
    }

    /// Close every cached tenant connection.
    pub async fn clear_connection_cache(&self) {
        self.router.clear_all().await;
    }

    /// Close one tenant's cached connection, e.g. after credential rotation.
    pub async fn evict_connection(&self, tenant_id: u64) -> bool {
        self.router.evict(tenant_id).await
    }
}
