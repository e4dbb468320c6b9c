//! End-to-end bootstrap against an in-memory directory.

use stratum_auth::CreateTenantRequest;
use stratum_core::models::tenant::DatabaseType;
use stratum_db::DbConfig;
use stratum_server::{App, ServerConfig, bootstrap};

async fn setup() -> App {
    let config = ServerConfig {
        db: DbConfig::in_memory(),
        ..ServerConfig::default()
    };
    bootstrap(config).await.unwrap()
}

#[tokio::test]
async fn bootstrap_seeds_and_records_the_system_tenant() {
    let app = setup().await;
    assert_eq!(app.config.system_tenant_id, Some(app.seed.system_tenant_id));

    let login = app
        .auth
        .login("superadmin@system.com", "Admin123!")
        .await
        .unwrap();
    assert_eq!(login.tenant.tenant.id, app.seed.system_tenant_id);

    let header = format!("Bearer {}", login.api_key);
    app.pipeline.guard(Some(&header), "tenant:manage").await.unwrap();
}

#[tokio::test]
async fn provisioned_tenants_are_usable_and_shutdown_clears_connections() {
    let app = setup().await;
    app.tenants
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

    let login = app.auth.login("owner@acme.test", "0wner!Pass").await.unwrap();
    let caller = app.pipeline.authenticate(Some(&login.api_key)).await.unwrap();
    assert_eq!(app.users.list_users(&caller.db).await.unwrap().len(), 1);
    assert_eq!(app.rbac.list_roles(&caller.db).await.unwrap().len(), 1);
    assert_eq!(app.tenants.cache_stats().await.cached_connections, 1);

    app.shutdown().await;
    assert_eq!(app.router.cached_count().await, 0);
}
