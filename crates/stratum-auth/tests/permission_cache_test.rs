//! Integration tests for the permission cache and RBAC invalidation.

use std::sync::Arc;
use std::time::Duration;

use stratum_auth::config::AuthConfig;
use stratum_auth::password::hash_password;
use stratum_auth::permission::{PermissionCache, user_permissions_key};
use stratum_auth::rbac::RbacService;
use stratum_auth::tenant::{CreateTenantRequest, TenantService};
use stratum_auth::users::{CreateUserRequest, UserService};
use stratum_cache::MemoryCache;
use stratum_core::cache::KeyValueCache;
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::permission::ADMIN_FULL;
use stratum_core::models::role::TENANT_ADMIN;
use stratum_core::models::tenant::DatabaseType;
use stratum_core::models::user::User;
use stratum_core::repository::{PermissionRepository, RoleRepository};
use stratum_core::router::ConnectionRouter;
use stratum_core::scope::Scoped;
use stratum_db::{DbConfig, DbHandle, SqlConnector, SuperAdmin, seed_directory};

const TTL: Duration = Duration::from_secs(600);

struct Env {
    db: Scoped<DbHandle>,
    cache: MemoryCache,
    perms: PermissionCache<MemoryCache>,
    rbac: RbacService<MemoryCache>,
    owner: User,
    clerk: User,
}

/// Seed a directory, provision one shared tenant and add a second user.
async fn setup() -> Env {
    let db_config = DbConfig::in_memory();
    let connector = SqlConnector::new(db_config.clone()).unwrap();
    let directory = connector.connect_directory().await.unwrap();
    let report = seed_directory(
        &directory,
        &db_config.directory_database,
        &SuperAdmin {
            username: "superadmin".into(),
            email: "superadmin@system.com".into(),
            password_hash: hash_password("Sup3r!secret", None).unwrap(),
        },
    )
    .await
    .unwrap();
    let config = AuthConfig {
        system_tenant_id: Some(report.system_tenant_id),
        ..AuthConfig::default()
    };

    let router = Arc::new(ConnectionRouter::new(connector, db_config.router_config()));
    let cache = MemoryCache::default();
    let tenants = TenantService::new(
        router.clone(),
        directory.clone(),
        cache.clone(),
        config.clone(),
    );
    let provisioned = tenants
        .create_tenant(CreateTenantRequest {
            name: "Acme".into(),
            database_type: DatabaseType::Shared,
            plan_id: None,
            plan_expires_at: None,
            admin_username: "owner".into(),
            admin_email: "owner@acme.test".into(),
            admin_password: "0wner!Pass".into(),
        })
        .await
        .unwrap();
    let db = router.resolve(&provisioned.tenant.tenant).await.unwrap();

    let perms = PermissionCache::new(cache.clone(), TTL);
    let users = UserService::new(directory, perms.clone(), config);
    let clerk = users
        .create_user(
            &db,
            None,
            CreateUserRequest {
                username: "clerk".into(),
                email: "clerk@acme.test".into(),
                password: "Cl3rk!pass".into(),
                role_id: provisioned.admin_role.id,
            },
        )
        .await
        .unwrap();
    // Start the clerk without any role.
    db.roles()
        .unassign_from_user(clerk.id, provisioned.admin_role.id)
        .await
        .unwrap();

    Env {
        db,
        cache,
        rbac: RbacService::new(perms.clone()),
        perms,
        owner: provisioned.admin,
        clerk,
    }
}

async fn permission_id(env: &Env, name: &str) -> u64 {
    env.db.permissions().get_by_name(name).await.unwrap().id
}

#[tokio::test]
async fn grant_assign_revoke_round_trip() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Catalog Editor", "").await.unwrap();
    assert!(!role.is_system);
    let product_create = permission_id(&env, "product:create").await;

    env.rbac
        .grant_permission(&env.db, role.id, product_create)
        .await
        .unwrap();
    env.rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();

    // Cold cache: resolved from the database and cached.
    assert!(
        env.perms
            .has_permission(&env.db, env.clerk.id, "product:create")
            .await
            .unwrap()
    );
    let key = user_permissions_key(env.db.tenant_id(), env.clerk.id);
    assert!(env.cache.get(&key).await.unwrap().is_some(), "miss must populate the cache");

    // Warm cache: same answer.
    assert!(
        env.perms
            .has_permission(&env.db, env.clerk.id, "product:create")
            .await
            .unwrap()
    );

    env.rbac.remove_role(&env.db, env.clerk.id, role.id).await.unwrap();
    assert!(
        !env.perms
            .has_permission(&env.db, env.clerk.id, "product:create")
            .await
            .unwrap(),
        "invalidation must expose the database's fresh answer"
    );
}

#[tokio::test]
async fn warm_entries_stay_stale_until_invalidated() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Stock", "").await.unwrap();
    let inventory_read = permission_id(&env, "inventory:read").await;
    env.rbac
        .grant_permission(&env.db, role.id, inventory_read)
        .await
        .unwrap();
    env.rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();
    assert!(
        env.perms
            .has_permission(&env.db, env.clerk.id, "inventory:read")
            .await
            .unwrap()
    );

    // Bypass the service: the cache does not notice.
    env.db
        .roles()
        .revoke_permission(role.id, inventory_read)
        .await
        .unwrap();
    assert!(
        env.perms
            .has_permission(&env.db, env.clerk.id, "inventory:read")
            .await
            .unwrap()
    );

    env.perms.invalidate_user(env.db.tenant_id(), env.clerk.id).await;
    assert!(
        !env.perms
            .has_permission(&env.db, env.clerk.id, "inventory:read")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn role_permission_changes_invalidate_the_whole_tenant() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Reporter", "").await.unwrap();
    env.rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();
    assert!(
        !env.perms
            .has_permission(&env.db, env.clerk.id, "report:view")
            .await
            .unwrap()
    );
    // Populate the owner's entry as well.
    env.perms.permissions(&env.db, env.owner.id).await.unwrap();

    let report_view = permission_id(&env, "report:view").await;
    env.rbac
        .set_role_permissions(&env.db, role.id, &[report_view])
        .await
        .unwrap();

    let tenant_id = env.db.tenant_id();
    assert!(env.cache.scan(&format!("user_perms:{tenant_id}:*")).await.unwrap().is_empty());
    assert!(
        env.perms
            .has_permission(&env.db, env.clerk.id, "report:view")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn admin_full_satisfies_any_check() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Root", "").await.unwrap();
    let admin_full = permission_id(&env, ADMIN_FULL).await;
    env.rbac.grant_permission(&env.db, role.id, admin_full).await.unwrap();
    env.rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();

    for permission in ["product:delete", "report:view", "anything:at_all"] {
        assert!(
            env.perms
                .has_permission(&env.db, env.clerk.id, permission)
                .await
                .unwrap(),
            "admin:full should grant {permission}"
        );
    }
}

#[tokio::test]
async fn tenant_admin_holds_only_user_and_role_permissions() {
    let env = setup().await;
    let names = env.perms.permissions(&env.db, env.owner.id).await.unwrap();
    assert!(!names.is_empty());
    assert!(
        names
            .iter()
            .all(|n| n.starts_with("user:") || n.starts_with("role:")),
        "unexpected permissions: {names:?}"
    );
}

#[tokio::test]
async fn system_roles_are_read_only() {
    let env = setup().await;
    let admin_role = env.db.roles().get_by_name(TENANT_ADMIN).await.unwrap();
    let product_create = permission_id(&env, "product:create").await;

    let err = env
        .rbac
        .grant_permission(&env.db, admin_role.id, product_create)
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::AuthorizationDenied { .. }), "got: {err:?}");

    let err = env
        .rbac
        .set_role_permissions(&env.db, admin_role.id, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::AuthorizationDenied { .. }));

    let err = env
        .rbac
        .revoke_permission(&env.db, admin_role.id, product_create)
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::AuthorizationDenied { .. }));
}

#[tokio::test]
async fn duplicate_assignment_conflicts() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Viewer", "").await.unwrap();
    env.rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();
    let err = env
        .rbac
        .assign_role(&env.db, env.clerk.id, role.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::AlreadyExists { .. }), "got: {err:?}");

    let err = env.rbac.create_role(&env.db, "Viewer", "").await.unwrap_err();
    assert!(matches!(err, StratumError::AlreadyExists { .. }));
}

#[tokio::test]
async fn get_role_lists_its_permissions() {
    let env = setup().await;
    let role = env.rbac.create_role(&env.db, "Buyer", "Purchasing").await.unwrap();
    let ids = [
        permission_id(&env, "inventory:read").await,
        permission_id(&env, "inventory:update").await,
    ];
    env.rbac.set_role_permissions(&env.db, role.id, &ids).await.unwrap();

    let detail = env.rbac.get_role(&env.db, role.id).await.unwrap();
    assert_eq!(detail.role.description, "Purchasing");
    assert_eq!(detail.permissions.len(), 2);
    assert!(env.rbac.list_roles(&env.db).await.unwrap().len() >= 2);

    let err = env
        .rbac
        .set_role_permissions(&env.db, role.id, &[999_999])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ---------------------------------------------------------------------------
// Unavailable cache
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct UnavailableCache;

fn unreachable_cache() -> StratumError {
    StratumError::Infrastructure("cache unreachable".into())
}

impl KeyValueCache for UnavailableCache {
    async fn get(&self, _key: &str) -> StratumResult<Option<String>> {
        Err(unreachable_cache())
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> StratumResult<()> {
        Err(unreachable_cache())
    }

    async fn delete(&self, _key: &str) -> StratumResult<()> {
        Err(unreachable_cache())
    }

    async fn scan(&self, _pattern: &str) -> StratumResult<Vec<String>> {
        Err(unreachable_cache())
    }
}

#[tokio::test]
async fn unavailable_cache_falls_back_to_the_database() {
    let env = setup().await;
    let perms = PermissionCache::new(UnavailableCache, TTL);
    let rbac = RbacService::new(perms.clone());

    let role = rbac.create_role(&env.db, "Offline", "").await.unwrap();
    let category_read = permission_id(&env, "category:read").await;
    rbac.grant_permission(&env.db, role.id, category_read).await.unwrap();
    rbac.assign_role(&env.db, env.clerk.id, role.id).await.unwrap();

    assert!(
        perms
            .has_permission(&env.db, env.clerk.id, "category:read")
            .await
            .unwrap()
    );
    assert!(
        !perms
            .has_permission(&env.db, env.clerk.id, "category:delete")
            .await
            .unwrap()
    );
}
