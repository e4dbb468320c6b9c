//! Integration tests for directory seeding.

use stratum_core::models::permission::ADMIN_FULL;
use stratum_core::models::role::SUPER_ADMINISTRATOR;
use stratum_core::models::tenant::DatabaseType;
use stratum_core::repository::{
    DirectoryStore, GlobalIdentityRepository, PermissionRepository, PlanRepository,
    RoleRepository, TenantRepository, TenantStore, UserRepository,
};
use stratum_core::scope::{Scope, Scoped};
use stratum_db::{DbConfig, DbHandle, SYSTEM_TENANT_NAME, SqlConnector, SuperAdmin, seed_directory};

async fn setup() -> DbHandle {
    let connector = SqlConnector::new(DbConfig::in_memory()).unwrap();
    connector.connect_directory().await.unwrap()
}

fn admin(hash: &str) -> SuperAdmin {
    SuperAdmin {
        username: "superadmin".into(),
        email: "superadmin@system.com".into(),
        password_hash: hash.into(),
    }
}

#[tokio::test]
async fn seeding_builds_the_directory() {
    let db = setup().await;
    let report = seed_directory(&db, "master_db", &admin("hash-1")).await.unwrap();

    assert_eq!(db.plans().list().await.unwrap().len(), 3);

    let system = db.tenants().get_by_id(report.system_tenant_id).await.unwrap();
    assert_eq!(system.name, SYSTEM_TENANT_NAME);
    assert_eq!(system.database_type, DatabaseType::Dedicated);
    assert_eq!(system.database_name, "master_db");
    assert!(system.plan_id.is_some());

    let tenant_create = db.permissions().get_by_name("tenant:create").await.unwrap();
    assert_eq!(tenant_create.category, "system");
    assert!(tenant_create.module_id.is_some());
    db.permissions().get_by_name(ADMIN_FULL).await.unwrap();

    let scoped = Scoped::new(db.clone(), Scope::isolated(report.system_tenant_id));
    let role = scoped.roles().get_by_name(SUPER_ADMINISTRATOR).await.unwrap();
    assert!(role.is_system);
    assert_eq!(
        scoped.roles().get_role_permissions(role.id).await.unwrap().len(),
        report.permissions
    );

    let names = scoped
        .roles()
        .user_permission_names(report.super_admin_user_id)
        .await
        .unwrap();
    assert!(names.iter().any(|n| n == ADMIN_FULL));

    let identity = db
        .identities()
        .get_by_email("superadmin@system.com")
        .await
        .unwrap();
    assert_eq!(identity.tenant_id, report.system_tenant_id);
}

#[tokio::test]
async fn seeding_twice_is_idempotent_and_refreshes_the_password() {
    let db = setup().await;
    let first = seed_directory(&db, "master_db", &admin("hash-1")).await.unwrap();
    let second = seed_directory(&db, "master_db", &admin("hash-2")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(db.plans().list().await.unwrap().len(), 3);
    assert_eq!(db.tenants().list().await.unwrap().len(), 1);

    let scoped = Scoped::new(db.clone(), Scope::isolated(second.system_tenant_id));
    let user = scoped
        .users()
        .get_by_id(second.super_admin_user_id)
        .await
        .unwrap();
    assert_eq!(user.password_hash, "hash-2");
    assert!(user.is_active);
    assert_eq!(scoped.roles().get_user_roles(user.id).await.unwrap().len(), 1);
}
