//! Per-request glue: credential, then tenant, then database, then permission.

use std::sync::Arc;
use std::time::Duration;

use stratum_core::cache::{KeyValueCache, get_json, set_json};
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::tenant::TenantWithPlan;
use stratum_core::repository::{DirectoryStore, TenantRepository};
use stratum_core::router::Connector;
use tracing::{debug, warn};

use crate::api_key;
use crate::error::AuthError;
use crate::permission::PermissionCache;
use crate::service::{AuthService, Authenticated};
use crate::tenant::tenant_info_key;

pub struct RequestPipeline<C: Connector, K> {
    auth: Arc<AuthService<C>>,
    permissions: PermissionCache<K>,
    tenant_info_ttl: Duration,
}

impl<C, K> RequestPipeline<C, K>
where
    C: Connector,
    C::Handle: DirectoryStore,
    K: KeyValueCache + Clone,
{
    pub fn new(auth: Arc<AuthService<C>>, permissions: PermissionCache<K>) -> Self {
        let tenant_info_ttl = Duration::from_secs(auth.config().tenant_info_ttl_secs);
        Self {
            auth,
            permissions,
            tenant_info_ttl,
        }
    }

    /// Resolve the bearer credential header into a caller.
    ///
    /// A missing, blank or malformed header fails before any I/O.
    pub async fn authenticate(
        &self,
        header: Option<&str>,
    ) -> StratumResult<Authenticated<C::Handle>> {
        let key = header.map(bearer_token).unwrap_or_default();
        if key.is_empty() {
            return Err(AuthError::MissingCredential.into());
        }
        let tenant_id = api_key::parse_tenant_id(key).map_err(|e| {
            debug!(error = %e, "rejecting malformed credential");
            AuthError::InvalidApiKey
        })?;

        let tenant = match self.tenant_info(tenant_id).await {
            Ok(tenant) => tenant,
            Err(e) if e.is_not_found() => return Err(AuthError::InvalidApiKey.into()),
            Err(e) => return Err(e),
        };
        self.auth.validate_api_key_for(tenant, key).await
    }

    /// Tenant record with plan, cached under `tenant_info:{id}`.
    pub async fn tenant_info(&self, tenant_id: u64) -> StratumResult<TenantWithPlan> {
        let key = tenant_info_key(tenant_id);
        let cache = self.permissions.cache();
        match get_json::<K, TenantWithPlan>(cache, &key).await {
            Ok(Some(tenant)) => return Ok(tenant),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "tenant cache read failed, using directory"),
        }

        let tenant = self
            .auth
            .directory()
            .tenants()
            .get_with_plan(tenant_id)
            .await?;
        if let Err(e) = set_json(cache, &key, &tenant, self.tenant_info_ttl).await {
            warn!(key, error = %e, "tenant cache write failed");
        }
        Ok(tenant)
    }

    pub async fn authorize(
        &self,
        caller: &Authenticated<C::Handle>,
        permission: &str,
    ) -> StratumResult<()> {
        if self
            .permissions
            .has_permission(&caller.db, caller.user.id, permission)
            .await?
        {
            Ok(())
        } else {
            debug!(
                tenant_id = caller.db.tenant_id(),
                user_id = caller.user.id,
                permission,
                "permission denied"
            );
            Err(StratumError::forbidden(format!(
                "missing permission '{permission}'"
            )))
        }
    }

    /// [`authenticate`](Self::authenticate) then [`authorize`](Self::authorize).
    pub async fn guard(
        &self,
        header: Option<&str>,
        permission: &str,
    ) -> StratumResult<Authenticated<C::Handle>> {
        let caller = self.authenticate(header).await?;
        self.authorize(&caller, permission).await?;
        Ok(caller)
    }
}

/// Credential carried by an `Authorization` value, with or without the
/// `Bearer` scheme. A bare scheme yields an empty credential.
fn bearer_token(header: &str) -> &str {
    let header = header.trim();
    match header.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => header,
    }
}
