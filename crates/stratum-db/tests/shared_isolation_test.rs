//! Row isolation between tenants that share one physical database.

use std::sync::Arc;

use chrono::Utc;
use stratum_core::models::permission::CreatePermission;
use stratum_core::models::role::CreateRole;
use stratum_core::models::tenant::{DatabaseType, Tenant};
use stratum_core::models::user::CreateUser;
use stratum_core::repository::{PermissionRepository, RoleRepository, UserRepository};
use stratum_core::router::ConnectionRouter;
use stratum_core::scope::Scoped;
use stratum_db::{DbConfig, DbHandle, SqlConnector};

fn shared_tenant(id: u64) -> Tenant {
    Tenant {
        id,
        name: format!("Shop {id}"),
        database_type: DatabaseType::Shared,
        database_name: "shared_tenants_db".into(),
        is_active: true,
        plan_id: None,
        plan_expires_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn user(name: &str) -> CreateUser {
    CreateUser {
        username: name.into(),
        email: format!("{name}@shop.com"),
        password_hash: "$argon2id$v=19$stub".into(),
        is_active: true,
    }
}

async fn setup() -> (Scoped<DbHandle>, Scoped<DbHandle>) {
    let config = DbConfig::in_memory();
    let router = Arc::new(ConnectionRouter::new(
        SqlConnector::new(config.clone()).unwrap(),
        config.router_config(),
    ));
    let a = router.resolve(&shared_tenant(1)).await.unwrap();
    let b = router.resolve(&shared_tenant(2)).await.unwrap();
    (a, b)
}

#[tokio::test]
async fn shared_tenants_use_one_physical_database() {
    let (a, b) = setup().await;
    assert_eq!(a.handle().database(), "shared_tenants_db");
    assert_eq!(b.handle().database(), "shared_tenants_db");
    assert_eq!(a.scope().row_filter(), Some(1));
    assert_eq!(b.scope().row_filter(), Some(2));
}

#[tokio::test]
async fn users_of_one_tenant_are_invisible_to_another() {
    let (a, b) = setup().await;
    let alice = a.users().create(user("alice")).await.unwrap();
    let bob = b.users().create(user("bob")).await.unwrap();
    assert_eq!(alice.tenant_id, 1);
    assert_eq!(bob.tenant_id, 2);

    assert!(b.users().get_by_id(alice.id).await.unwrap_err().is_not_found());
    assert!(b.users().get_by_email("alice@shop.com").await.unwrap_err().is_not_found());
    assert!(a.users().get_by_login("bob").await.unwrap_err().is_not_found());

    let listed: Vec<u64> = a.users().list().await.unwrap().iter().map(|u| u.id).collect();
    assert_eq!(listed, vec![alice.id]);
    assert_eq!(a.users().count().await.unwrap(), 1);
    assert_eq!(b.users().count().await.unwrap(), 1);
}

#[tokio::test]
async fn same_username_may_exist_in_two_tenants() {
    let (a, b) = setup().await;
    a.users().create(user("admin")).await.unwrap();
    b.users().create(user("admin")).await.unwrap();
    assert_eq!(a.users().get_by_username("admin").await.unwrap().tenant_id, 1);
    assert_eq!(b.users().get_by_username("admin").await.unwrap().tenant_id, 2);
}

#[tokio::test]
async fn writes_cannot_reach_another_tenants_rows() {
    let (a, b) = setup().await;
    let alice = a.users().create(user("alice")).await.unwrap();

    assert!(b.users().delete(alice.id).await.unwrap_err().is_not_found());
    assert!(
        b.users()
            .update(
                alice.id,
                stratum_core::models::user::UpdateUser {
                    is_active: Some(false),
                    ..Default::default()
                }
            )
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(a.users().get_by_id(alice.id).await.unwrap().is_active);
}

#[tokio::test]
async fn roles_and_permissions_do_not_leak_across_tenants() {
    let (a, b) = setup().await;
    let permission = a
        .permissions()
        .create(CreatePermission::new("product:create", "create product"))
        .await
        .unwrap();
    let role = a
        .roles()
        .create(CreateRole {
            name: "Editor".into(),
            description: "edits".into(),
            is_system: false,
        })
        .await
        .unwrap();
    a.roles().grant_permission(role.id, permission.id).await.unwrap();
    let alice = a.users().create(user("alice")).await.unwrap();
    a.roles().assign_to_user(alice.id, role.id).await.unwrap();

    assert!(b.roles().list().await.unwrap().is_empty());
    assert!(b.roles().get_by_id(role.id).await.unwrap_err().is_not_found());
    assert!(b.roles().user_permission_names(alice.id).await.unwrap().is_empty());
    assert_eq!(
        a.roles().user_permission_names(alice.id).await.unwrap(),
        vec!["product:create".to_string()]
    );

    let bob = b.users().create(user("bob")).await.unwrap();
    let err = b.roles().assign_to_user(bob.id, role.id).await.unwrap_err();
    assert!(err.is_not_found());
}
