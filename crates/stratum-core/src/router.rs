//! Tenant connection router.
//!
//! Owns the process-wide cache of live per-tenant database handles. Handles
//! are opened lazily on first access, with double-checked locking so that
//! concurrent first callers for the same tenant share one connection.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{StratumError, StratumResult};
use crate::models::tenant::Tenant;
use crate::scope::{Scope, Scoped};

/// Which tables a physical database must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Central directory: plans, tenants, identities, catalog, RBAC, users.
    Directory,
    /// Regular tenant database: catalog, RBAC, users and business tables.
    Tenant,
    /// Reserved system database: catalog, RBAC and users only.
    System,
}

/// Opens and closes physical connections. The seam between routing and the driver.
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Open a bounded pool to `database`, sized for `kind`.
    ///
    /// Unreachable servers must surface as [`StratumError::Infrastructure`].
    fn connect(
        &self,
        database: &str,
        kind: SchemaKind,
    ) -> impl Future<Output = StratumResult<Self::Handle>> + Send;

    /// Create missing tables and apply pending migrations.
    fn ensure_schema(
        &self,
        handle: &Self::Handle,
        kind: SchemaKind,
    ) -> impl Future<Output = StratumResult<()>> + Send;

    /// `CREATE DATABASE IF NOT EXISTS` through a throwaway server-level connection.
    fn create_database(&self, database: &str) -> impl Future<Output = StratumResult<()>> + Send;

    fn close(&self, handle: &Self::Handle) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Physical database shared by every `shared` tenant.
    pub shared_database: String,
    /// Reserved database that only ever carries RBAC tables.
    pub system_database: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            shared_database: "shared_tenants_db".into(),
            system_database: "master_db".into(),
        }
    }
}

pub struct ConnectionRouter<C: Connector> {
    connector: C,
    config: RouterConfig,
    cache: RwLock<HashMap<u64, C::Handle>>,
}

impl<C: Connector> ConnectionRouter<C> {
    pub fn new(connector: C, config: RouterConfig) -> Self {
        Self {
            connector,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Live handle for `tenant`, opening it on first access.
    pub async fn get(&self, tenant: &Tenant) -> StratumResult<C::Handle> {
        if tenant.id == 0 {
            return Err(StratumError::validation("tenant id cannot be zero"));
        }
        if !tenant.is_active {
            return Err(StratumError::unauthorized("tenant account is suspended"));
        }

        {
            let cache = self.cache.read().await;
            if let Some(handle) = cache.get(&tenant.id) {
                return Ok(handle.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have finished initialization while we waited.
        if let Some(handle) = cache.get(&tenant.id) {
            return Ok(handle.clone());
        }

        let database = tenant.actual_database_name(&self.config.shared_database);
        let kind = self.schema_kind(database);
        debug!(tenant_id = tenant.id, database, ?kind, "opening tenant connection");

        let handle = self.connector.connect(database, kind).await?;
        if let Err(e) = self.connector.ensure_schema(&handle, kind).await {
            warn!(tenant_id = tenant.id, database, error = %e, "tenant schema setup failed");
            self.connector.close(&handle).await;
            return Err(e);
        }

        cache.insert(tenant.id, handle.clone());
        info!(tenant_id = tenant.id, database, "tenant connection cached");
        Ok(handle)
    }

    /// [`get`](Self::get) plus the scoping rule: shared tenants are row-filtered.
    pub async fn resolve(&self, tenant: &Tenant) -> StratumResult<Scoped<C::Handle>> {
        let handle = self.get(tenant).await?;
        Ok(Scoped::new(handle, Scope::for_tenant(tenant)))
    }

    pub async fn create_dedicated_database(&self, tenant: &Tenant) -> StratumResult<()> {
        self.connector.create_database(&tenant.database_name).await
    }

    pub async fn create_shared_database(&self) -> StratumResult<()> {
        self.connector
            .create_database(&self.config.shared_database)
            .await
    }

    /// Close and forget the tenant's handle. Returns whether one was cached.
    pub async fn evict(&self, tenant_id: u64) -> bool {
        let mut cache = self.cache.write().await;
        let Some(handle) = cache.get(&tenant_id) else {
            return false;
        };
        self.connector.close(handle).await;
        cache.remove(&tenant_id);
        info!(tenant_id, "tenant connection evicted");
        true
    }

    /// Close every cached handle and empty the cache.
    pub async fn clear_all(&self) {
        let mut cache = self.cache.write().await;
        for handle in cache.values() {
            self.connector.close(handle).await;
        }
        let count = cache.len();
        cache.clear();
        info!(count, "tenant connection cache cleared");
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    fn schema_kind(&self, database: &str) -> SchemaKind {
        if database == self.config.system_database {
            SchemaKind::System
        } else {
            SchemaKind::Tenant
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::models::tenant::DatabaseType;

    #[derive(Debug)]
    struct StubConnection {
        id: usize,
        database: String,
        kind: SchemaKind,
        closed: AtomicBool,
    }

    #[derive(Default)]
    struct CountingConnector {
        opened: AtomicUsize,
        closed: AtomicUsize,
        fail_schema: AtomicBool,
    }

    impl Connector for Arc<CountingConnector> {
        type Handle = Arc<StubConnection>;

        async fn connect(&self, database: &str, kind: SchemaKind) -> StratumResult<Self::Handle> {
            // Widen the race window between concurrent first callers.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(StubConnection {
                id,
                database: database.to_string(),
                kind,
                closed: AtomicBool::new(false),
            }))
        }

        async fn ensure_schema(&self, _handle: &Self::Handle, _kind: SchemaKind) -> StratumResult<()> {
            if self.fail_schema.load(Ordering::SeqCst) {
                return Err(StratumError::Database("table creation failed".into()));
            }
            Ok(())
        }

        async fn create_database(&self, _database: &str) -> StratumResult<()> {
            Ok(())
        }

        async fn close(&self, handle: &Self::Handle) {
            handle.closed.store(true, Ordering::SeqCst);
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tenant(id: u64, database_type: DatabaseType) -> Tenant {
        Tenant {
            id,
            name: format!("tenant {id}"),
            database_type,
            database_name: format!("tenant_{id}_db"),
            is_active: true,
            plan_id: None,
            plan_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn setup() -> (Arc<CountingConnector>, Arc<ConnectionRouter<Arc<CountingConnector>>>) {
        let connector = Arc::new(CountingConnector::default());
        let router = Arc::new(ConnectionRouter::new(
            connector.clone(),
            RouterConfig::default(),
        ));
        (connector, router)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_opens_one_connection() {
        let (connector, router) = setup();
        let t = tenant(1, DatabaseType::Dedicated);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let router = router.clone();
            let t = t.clone();
            tasks.push(tokio::spawn(async move { router.get(&t).await.unwrap().id }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }

        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(router.cached_count().await, 1);
    }

    #[tokio::test]
    async fn zero_tenant_id_is_rejected_without_connecting() {
        let (connector, router) = setup();
        let err = router.get(&tenant(0, DatabaseType::Shared)).await.unwrap_err();
        assert!(matches!(err, StratumError::Validation { .. }));
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_tenants_connect_to_the_shared_database() {
        let (_, router) = setup();
        let a = router.get(&tenant(1, DatabaseType::Shared)).await.unwrap();
        let b = router.get(&tenant(2, DatabaseType::Shared)).await.unwrap();
        assert_eq!(a.database, "shared_tenants_db");
        assert_eq!(b.database, "shared_tenants_db");
        assert_eq!(a.kind, SchemaKind::Tenant);

        let scoped = router.resolve(&tenant(2, DatabaseType::Shared)).await.unwrap();
        assert_eq!(scoped.scope().row_filter(), Some(2));
    }

    #[tokio::test]
    async fn dedicated_tenants_are_not_row_filtered() {
        let (_, router) = setup();
        let scoped = router.resolve(&tenant(5, DatabaseType::Dedicated)).await.unwrap();
        assert_eq!(scoped.handle().database, "tenant_5_db");
        assert_eq!(scoped.scope().row_filter(), None);
    }

    #[tokio::test]
    async fn system_database_gets_the_system_schema() {
        let (_, router) = setup();
        let mut t = tenant(1, DatabaseType::Dedicated);
        t.database_name = "master_db".into();
        let handle = router.get(&t).await.unwrap();
        assert_eq!(handle.kind, SchemaKind::System);
    }

    #[tokio::test]
    async fn evict_closes_and_next_get_reconnects() {
        let (connector, router) = setup();
        let t = tenant(3, DatabaseType::Dedicated);

        let first = router.get(&t).await.unwrap();
        assert!(router.evict(t.id).await);
        assert!(first.closed.load(Ordering::SeqCst));
        assert_eq!(router.cached_count().await, 0);

        let second = router.get(&t).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
        assert!(!router.evict(99).await);
    }

    #[tokio::test]
    async fn clear_all_closes_every_handle() {
        let (connector, router) = setup();
        let a = router.get(&tenant(1, DatabaseType::Dedicated)).await.unwrap();
        let b = router.get(&tenant(2, DatabaseType::Shared)).await.unwrap();
        assert_eq!(router.cached_count().await, 2);

        router.clear_all().await;
        assert_eq!(router.cached_count().await, 0);
        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
        assert_eq!(connector.closed.load(Ordering::SeqCst), 2);

        let again = router.get(&tenant(1, DatabaseType::Dedicated)).await.unwrap();
        assert_ne!(again.id, a.id);
    }

    #[tokio::test]
    async fn suspended_tenant_is_unauthorized_even_when_cached() {
        let (_, router) = setup();
        let mut t = tenant(4, DatabaseType::Dedicated);
        let cached = router.get(&t).await.unwrap();

        t.is_active = false;
        let err = router.get(&t).await.unwrap_err();
        assert!(matches!(err, StratumError::AuthenticationFailed { .. }));
        // Suspension alone does not close the cached connection.
        assert!(!cached.closed.load(Ordering::SeqCst));
        assert_eq!(router.cached_count().await, 1);
    }

    #[tokio::test]
    async fn schema_failure_is_not_cached() {
        let (connector, router) = setup();
        connector.fail_schema.store(true, Ordering::SeqCst);
        let t = tenant(6, DatabaseType::Dedicated);

        assert!(router.get(&t).await.is_err());
        assert_eq!(router.cached_count().await, 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);

        connector.fail_schema.store(false, Ordering::SeqCst);
        router.get(&t).await.unwrap();
        assert_eq!(router.cached_count().await, 1);
    }
}
