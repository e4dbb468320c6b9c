//! Permission resolution with a TTL-bound cache in front of RBAC.
//!
//! Entries live under `user_perms:{tenant}:{user}` as a JSON array of
//! permission names. Cache failures never turn into authorization
//! failures: reads fall back to the database and writes are best effort.

use std::time::Duration;

use stratum_core::cache::{KeyValueCache, get_json, set_json};
use stratum_core::error::StratumResult;
use stratum_core::models::permission::ADMIN_FULL;
use stratum_core::repository::{RoleRepository, TenantStore};
use stratum_core::scope::Scoped;
use tracing::{debug, warn};

pub fn user_permissions_key(tenant_id: u64, user_id: u64) -> String {
    format!("user_perms:{tenant_id}:{user_id}")
}

pub fn user_list_key(tenant_id: u64) -> String {
    format!("tenant:{tenant_id}:users:list")
}

#[derive(Clone)]
pub struct PermissionCache<K> {
    cache: K,
    ttl: Duration,
}

impl<K: KeyValueCache + Clone> PermissionCache<K> {
    pub fn new(cache: K, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &K {
        &self.cache
    }

    /// Distinct permission names held by `user_id` through its roles.
    pub async fn permissions<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
    ) -> StratumResult<Vec<String>> {
        let key = user_permissions_key(db.tenant_id(), user_id);
        match get_json::<K, Vec<String>>(&self.cache, &key).await {
            Ok(Some(names)) => return Ok(names),
            Ok(None) => debug!(key, "permission cache miss"),
            Err(e) => warn!(key, error = %e, "permission cache read failed, using database"),
        }

        let names = db.roles().user_permission_names(user_id).await?;
        if let Err(e) = set_json(&self.cache, &key, &names, self.ttl).await {
            warn!(key, error = %e, "permission cache write failed");
        }
        Ok(names)
    }

    /// Whether the user holds `permission`. `admin:full` satisfies every check.
    pub async fn has_permission<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
        permission: &str,
    ) -> StratumResult<bool> {
        let names = self.permissions(db, user_id).await?;
        Ok(names.iter().any(|n| n == permission || n == ADMIN_FULL))
    }

    pub async fn invalidate_user(&self, tenant_id: u64, user_id: u64) {
        self.delete(&user_permissions_key(tenant_id, user_id)).await;
    }

    /// Drop every cached permission set of the tenant plus its user list.
    pub async fn invalidate_tenant(&self, tenant_id: u64) {
        let pattern = format!("user_perms:{tenant_id}:*");
        match self.cache.scan(&pattern).await {
            Ok(keys) => {
                for key in keys {
                    self.delete(&key).await;
                }
            }
            Err(e) => warn!(tenant_id, error = %e, "permission cache scan failed"),
        }
        self.delete(&user_list_key(tenant_id)).await;
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, error = %e, "cache invalidation failed");
        }
    }
}
