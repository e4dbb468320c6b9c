//! Credential service: login, API key validation and logout.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::tenant::{Tenant, TenantWithPlan};
use stratum_core::models::user::User;
use stratum_core::repository::{
    DirectoryStore, GlobalIdentityRepository, TenantRepository, UserRepository,
};
use stratum_core::router::{ConnectionRouter, Connector};
use stratum_core::scope::{Scope, Scoped};
use tracing::{debug, info, warn};

use crate::api_key;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;

/// A caller resolved from a bearer credential.
#[derive(Debug, Clone)]
pub struct Authenticated<H> {
    pub user: User,
    pub tenant: TenantWithPlan,
    /// Handle to the tenant's database, row-filtered for shared tenants.
    pub db: Scoped<H>,
}

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginOutput {
    pub user: User,
    pub tenant: TenantWithPlan,
    /// Raw API key. Returned once; only its digest is stored.
    pub api_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
///
/// Generic over the connector so the auth layer has no dependency on the
/// database crate.
pub struct AuthService<C: Connector> {
    router: Arc<ConnectionRouter<C>>,
    directory: C::Handle,
    config: AuthConfig,
}

impl<C> AuthService<C>
where
    C: Connector,
    C::Handle: DirectoryStore,
{
    pub fn new(router: Arc<ConnectionRouter<C>>, directory: C::Handle, config: AuthConfig) -> Self {
        Self {
            router,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ConnectionRouter<C>> {
        &self.router
    }

    pub fn directory(&self) -> &C::Handle {
        &self.directory
    }

    /// Database holding `tenant`'s users.
    ///
    /// The system tenant lives in the directory database; every other
    /// tenant goes through the connection router.
    pub async fn tenant_database(&self, tenant: &Tenant) -> StratumResult<Scoped<C::Handle>> {
        if self.config.is_system_tenant(tenant.id) {
            if !tenant.is_active {
                return Err(AuthError::TenantSuspended.into());
            }
            return Ok(Scoped::new(
                self.directory.clone(),
                Scope::isolated(tenant.id),
            ));
        }
        self.router.resolve(tenant).await
    }

    /// Authenticate by email (or username) and password, issuing a new API key.
    ///
    /// The tenant is found through the global identity index. Any key
    /// issued earlier for the same user is overwritten.
    pub async fn login(&self, identifier: &str, password: &str) -> StratumResult<LoginOutput> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials.into());
        }

        let email = identifier.to_lowercase();
        match self.directory.identities().get_by_email(&email).await {
            Ok(identity) => {
                let tenant = match self
                    .directory
                    .tenants()
                    .get_with_plan(identity.tenant_id)
                    .await
                {
                    Ok(tenant) => tenant,
                    Err(e) if e.is_not_found() => {
                        warn!(
                            tenant_id = identity.tenant_id,
                            "global identity points at a missing tenant"
                        );
                        return Err(AuthError::InvalidCredentials.into());
                    }
                    Err(e) => return Err(e),
                };
                self.login_in_tenant(tenant, identifier, password).await
            }
            Err(e) if e.is_not_found() => {
                debug!("no global identity for login identifier");
                if self.config.tenant_scan_fallback {
                    self.scan_login(identifier, password).await
                } else {
                    Err(AuthError::InvalidCredentials.into())
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn login_in_tenant(
        &self,
        tenant: TenantWithPlan,
        identifier: &str,
        password: &str,
    ) -> StratumResult<LoginOutput> {
        if !tenant.tenant.is_active {
            return Err(AuthError::TenantSuspended.into());
        }
        let db = self.tenant_database(&tenant.tenant).await?;

        let user = match db.users().get_by_login(identifier).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!(tenant_id = tenant.tenant.id, "login identifier not found in tenant");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };
        self.check_password(&user, password)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        self.issue_api_key(&db, user, tenant).await
    }

    /// Degraded login for identities missing from the index: the directory
    /// database first, then every other active tenant.
    async fn scan_login(&self, identifier: &str, password: &str) -> StratumResult<LoginOutput> {
        let tenants = self.directory.tenants();
        let mut candidates = tenants.list().await?;
        candidates.sort_by_key(|t| !self.config.is_system_tenant(t.id));
        warn!(tenants = candidates.len(), "falling back to tenant scan for login");

        for tenant in candidates {
            if !tenant.is_active {
                continue;
            }
            let db = match self.tenant_database(&tenant).await {
                Ok(db) => db,
                Err(e) => {
                    warn!(tenant_id = tenant.id, error = %e, "skipping tenant during login scan");
                    continue;
                }
            };
            match db.users().get_by_login(identifier).await {
                Ok(user) => {
                    self.check_password(&user, password)?;
                    if !user.is_active {
                        return Err(AuthError::AccountDisabled.into());
                    }
                    let tenant = tenants.get_with_plan(tenant.id).await?;
                    return self.issue_api_key(&db, user, tenant).await;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(tenant_id = tenant.id, error = %e, "user lookup failed during login scan");
                }
            }
        }
        Err(AuthError::InvalidCredentials.into())
    }

    fn check_password(&self, user: &User, password: &str) -> StratumResult<()> {
        let valid =
            password::verify_password(password, &user.password_hash, self.config.pepper.as_deref())?;
        if !valid {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(())
    }

    async fn issue_api_key(
        &self,
        db: &Scoped<C::Handle>,
        user: User,
        tenant: TenantWithPlan,
    ) -> StratumResult<LoginOutput> {
        let api_key = api_key::generate(tenant.tenant.id);
        let key_hash = api_key::digest(&api_key);
        let expires_at = Utc::now() + Duration::seconds(self.config.api_key_lifetime_secs as i64);

        db.users().set_api_key(user.id, &key_hash, expires_at).await?;
        info!(tenant_id = tenant.tenant.id, user_id = user.id, "API key issued");

        Ok(LoginOutput {
            user: User {
                api_key_hash: Some(key_hash),
                api_key_expires_at: Some(expires_at),
                ..user
            },
            tenant,
            api_key,
            expires_at,
        })
    }

    /// Resolve an API key into its user, tenant and database handle.
    ///
    /// Malformed keys are rejected before any I/O.
    pub async fn validate_api_key(&self, key: &str) -> StratumResult<Authenticated<C::Handle>> {
        let tenant_id = api_key::parse_tenant_id(key)?;
        let tenant = match self.directory.tenants().get_with_plan(tenant_id).await {
            Ok(tenant) => tenant,
            Err(e) if e.is_not_found() => {
                debug!(tenant_id, "API key names an unknown tenant");
                return Err(AuthError::InvalidApiKey.into());
            }
            Err(e) => return Err(e),
        };
        self.validate_api_key_for(tenant, key).await
    }

    /// Validate `key` against an already loaded tenant record.
    pub async fn validate_api_key_for(
        &self,
        tenant: TenantWithPlan,
        key: &str,
    ) -> StratumResult<Authenticated<C::Handle>> {
        if api_key::parse_tenant_id(key)? != tenant.tenant.id {
            return Err(AuthError::InvalidApiKey.into());
        }
        if !tenant.tenant.is_active {
            return Err(AuthError::TenantSuspended.into());
        }

        let db = self.tenant_database(&tenant.tenant).await?;
        let user = match db.users().get_by_api_key_hash(&api_key::digest(key)).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AuthError::InvalidApiKey.into()),
            Err(e) => return Err(e),
        };
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }
        if !user.has_live_api_key(Utc::now()) {
            return Err(AuthError::ApiKeyExpired.into());
        }

        Ok(Authenticated { user, tenant, db })
    }

    /// Revoke `key`. Unknown, expired and malformed keys are not errors.
    pub async fn logout(&self, key: &str) -> StratumResult<()> {
        let Ok(tenant_id) = api_key::parse_tenant_id(key) else {
            debug!("ignoring logout with malformed key");
            return Ok(());
        };
        let tenant = match self.directory.tenants().get_by_id(tenant_id).await {
            Ok(tenant) => tenant,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let db = match self.tenant_database(&tenant).await {
            Ok(db) => db,
            // Keys of a suspended tenant cannot be validated anyway.
            Err(StratumError::AuthenticationFailed { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let revoked = db.users().clear_api_key(&api_key::digest(key)).await?;
        debug!(tenant_id, revoked, "logout");
        Ok(())
    }
}
