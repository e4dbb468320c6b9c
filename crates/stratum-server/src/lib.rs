//! Stratum server bootstrap.
//!
//! Opens the directory database, seeds it, and wires the routing, cache
//! and auth services together into an [`App`].

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use stratum_auth::password::hash_password;
use stratum_auth::{
    AuthConfig, AuthService, PermissionCache, RbacService, RequestPipeline, TenantService,
    UserService,
};
use stratum_cache::MemoryCache;
use stratum_core::router::ConnectionRouter;
use stratum_db::{DbHandle, SeedReport, SqlConnector, SuperAdmin, seed_directory};
use tracing::{info, warn};

pub use config::{AdminConfig, CONFIG_FILE, ServerConfig};

pub struct App {
    pub config: AuthConfig,
    pub seed: SeedReport,
    pub directory: DbHandle,
    pub router: Arc<ConnectionRouter<SqlConnector>>,
    pub cache: MemoryCache,
    pub auth: Arc<AuthService<SqlConnector>>,
    pub pipeline: RequestPipeline<SqlConnector, MemoryCache>,
    pub tenants: TenantService<SqlConnector, MemoryCache>,
    pub rbac: RbacService<MemoryCache>,
    pub users: UserService<DbHandle, MemoryCache>,
}

pub async fn bootstrap(config: ServerConfig) -> Result<App> {
    let connector = SqlConnector::new(config.db.clone()).context("invalid database configuration")?;
    let directory = connector
        .connect_directory()
        .await
        .context("failed to open the directory database")?;

    let password_hash = hash_password(&config.admin.password, config.auth.pepper.as_deref())
        .context("failed to hash the super-admin password")?;
    let seed = seed_directory(
        &directory,
        &config.db.directory_database,
        &SuperAdmin {
            username: config.admin.username.clone(),
            email: config.admin.email.clone(),
            password_hash,
        },
    )
    .await
    .context("failed to seed the directory")?;
    info!(
        system_tenant_id = seed.system_tenant_id,
        permissions = seed.permissions,
        "directory seeded"
    );

    let auth_config = AuthConfig {
        system_tenant_id: Some(seed.system_tenant_id),
        ..config.auth
    };
    let router = Arc::new(ConnectionRouter::new(connector, config.db.router_config()));
    if let Err(e) = router.create_shared_database().await {
        warn!(error = %e, "failed to create the shared tenant database");
    }

    let cache = MemoryCache::new(&config.cache);
    let permissions = PermissionCache::new(
        cache.clone(),
        Duration::from_secs(auth_config.permission_ttl_secs),
    );
    let auth = Arc::new(AuthService::new(
        router.clone(),
        directory.clone(),
        auth_config.clone(),
    ));

    Ok(App {
        pipeline: RequestPipeline::new(auth.clone(), permissions.clone()),
        tenants: TenantService::new(
            router.clone(),
            directory.clone(),
            cache.clone(),
            auth_config.clone(),
        ),
        rbac: RbacService::new(permissions.clone()),
        users: UserService::new(directory.clone(), permissions, auth_config.clone()),
        config: auth_config,
        seed,
        directory,
        router,
        cache,
        auth,
    })
}

impl App {
    /// Close every cached tenant connection and the directory pool.
    pub async fn shutdown(&self) {
        self.router.clear_all().await;
        self.directory.pool().close().await;
        info!("connections closed");
    }
}
