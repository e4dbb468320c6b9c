//! Idempotent seeding of the directory database.
//!
//! Creates the default plans, the system tenant, the module and permission
//! catalog, the "Super Administrator" role holding every permission, and a
//! super-admin user registered in the global identity index. Running it
//! again only refreshes the super-admin password and active flag.

use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::global_identity::CreateGlobalIdentity;
use stratum_core::models::module::CreateModule;
use stratum_core::models::permission::{ADMIN_FULL, CreatePermission};
use stratum_core::models::plan::{CreatePlan, PlanType};
use stratum_core::models::role::{CreateRole, SUPER_ADMINISTRATOR};
use stratum_core::models::tenant::{CreateTenant, DatabaseType};
use stratum_core::models::user::{CreateUser, UpdateUser};
use stratum_core::repository::{
    DirectoryStore, GlobalIdentityRepository, ModuleRepository, PermissionRepository,
    PlanRepository, RoleRepository, TenantRepository, UserRepository,
};
use stratum_core::scope::{Scope, Scoped};
use tracing::info;

pub const SYSTEM_TENANT_NAME: &str = "Master Tenant";

/// Super-admin account to create or refresh.
#[derive(Debug, Clone)]
pub struct SuperAdmin {
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub system_tenant_id: u64,
    pub super_admin_role_id: u64,
    pub super_admin_user_id: u64,
    pub permissions: usize,
}

fn default_plans() -> Vec<CreatePlan> {
    vec![
        CreatePlan {
            name: "Free Starter".into(),
            plan_type: PlanType::Free,
            price: 0,
            max_users: 2,
            max_products: 5,
            storage_limit_mb: 500,
        },
        CreatePlan {
            name: "Pro Monthly".into(),
            plan_type: PlanType::Standard,
            price: 2999,
            max_users: 10,
            max_products: 100,
            storage_limit_mb: 5000,
        },
        CreatePlan {
            name: "Pro Yearly".into(),
            plan_type: PlanType::Premium,
            price: 29999,
            max_users: 10,
            max_products: 100,
            storage_limit_mb: 5000,
        },
    ]
}

const MODULES: &[(&str, &str)] = &[
    ("User Management", "Manage tenant users and roles"),
    ("Product Management", "Manage products catalog"),
    ("Category Management", "Manage product categories"),
    ("Inventory Management", "Track stock and warehouses"),
    ("Reporting", "View sales and audit logs"),
    ("System Admin", "Super Admin only features"),
];

/// `(name, category override, module index)`
const PERMISSIONS: &[(&str, Option<&str>, usize)] = &[
    ("user:create", None, 0),
    ("user:read", None, 0),
    ("user:update", None, 0),
    ("user:delete", None, 0),
    ("role:manage", None, 0),
    ("product:create", None, 1),
    ("product:read", None, 1),
    ("product:update", None, 1),
    ("product:delete", None, 1),
    ("category:create", None, 2),
    ("category:read", None, 2),
    ("category:update", None, 2),
    ("category:delete", None, 2),
    ("inventory:read", None, 3),
    ("inventory:update", None, 3),
    ("report:view", None, 4),
    ("tenant:create", Some("system"), 5),
    ("tenant:manage", Some("system"), 5),
    ("plan:manage", Some("system"), 5),
    ("system:manage", Some("system"), 5),
    (ADMIN_FULL, None, 5),
];

/// Seed `directory`, whose physical database doubles as the system tenant's.
pub async fn seed_directory<D: DirectoryStore>(
    directory: &D,
    directory_database: &str,
    admin: &SuperAdmin,
) -> StratumResult<SeedReport> {
    let plans = directory.plans();
    let existing = plans.list().await?;
    for plan in default_plans() {
        if !existing.iter().any(|p| p.name == plan.name) {
            info!(plan = %plan.name, "seeding plan");
            plans.create(plan).await?;
        }
    }
    let free_plan = plans.get_by_type(PlanType::Free).await?.into_iter().next();

    let tenants = directory.tenants();
    let system_tenant = match tenants.get_by_name(SYSTEM_TENANT_NAME).await {
        Ok(tenant) => tenant,
        Err(e) if e.is_not_found() => {
            tenants
                .create(CreateTenant {
                    name: SYSTEM_TENANT_NAME.into(),
                    database_type: DatabaseType::Dedicated,
                    database_name: directory_database.into(),
                    plan_id: free_plan.map(|p| p.id),
                    plan_expires_at: None,
                })
                .await?
        }
        Err(e) => return Err(e),
    };

    let modules = directory.modules();
    let mut module_ids = Vec::with_capacity(MODULES.len());
    for (name, description) in MODULES {
        let module = match modules.get_by_name(name).await {
            Ok(module) => module,
            Err(e) if e.is_not_found() => {
                modules
                    .create(CreateModule {
                        name: (*name).into(),
                        description: (*description).into(),
                    })
                    .await?
            }
            Err(e) => return Err(e),
        };
        module_ids.push(module.id);
    }

    let permissions = directory.permissions();
    for (name, category, module) in PERMISSIONS {
        match permissions.get_by_name(name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                let mut input = CreatePermission::new(*name, describe(name));
                if let Some(category) = category {
                    input = input.with_category(*category);
                }
                if let Some(module_id) = module_ids.get(*module) {
                    input = input.in_module(*module_id);
                }
                permissions.create(input).await?;
            }
            Err(e) => return Err(e),
        }
    }
    let all_permissions = permissions.list().await?;

    let system = Scoped::new(directory.clone(), Scope::isolated(system_tenant.id));
    let roles = system.roles();
    let role = match roles.get_by_name(SUPER_ADMINISTRATOR).await {
        Ok(role) => role,
        Err(e) if e.is_not_found() => {
            roles
                .create(CreateRole {
                    name: SUPER_ADMINISTRATOR.into(),
                    description: "System Owner - Full Access".into(),
                    is_system: true,
                })
                .await?
        }
        Err(e) => return Err(e),
    };
    let permission_ids: Vec<u64> = all_permissions.iter().map(|p| p.id).collect();
    roles.set_permissions(role.id, &permission_ids).await?;

    let users = system.users();
    let user = match users.get_by_email(&admin.email).await {
        Ok(existing) => {
            let user = users
                .update(
                    existing.id,
                    UpdateUser {
                        password_hash: Some(admin.password_hash.clone()),
                        is_active: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            info!(username = %user.username, "super admin refreshed");
            user
        }
        Err(e) if e.is_not_found() => {
            let user = users
                .create(CreateUser {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    password_hash: admin.password_hash.clone(),
                    is_active: true,
                })
                .await?;
            roles.assign_to_user(user.id, role.id).await?;
            info!(username = %user.username, "super admin created");
            user
        }
        Err(e) => return Err(e),
    };

    match directory
        .identities()
        .create(CreateGlobalIdentity {
            email: admin.email.clone(),
            tenant_id: system_tenant.id,
        })
        .await
    {
        Ok(_) => {}
        Err(StratumError::AlreadyExists { .. }) => {}
        Err(e) => return Err(e),
    }

    Ok(SeedReport {
        system_tenant_id: system_tenant.id,
        super_admin_role_id: role.id,
        super_admin_user_id: user.id,
        permissions: all_permissions.len(),
    })
}

fn describe(permission: &str) -> String {
    match permission.split_once(':') {
        Some((resource, action)) => format!("{action} {resource}"),
        None => permission.to_string(),
    }
}
