//! User management within a tenant.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratum_core::cache::{KeyValueCache, get_json, set_json};
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::global_identity::CreateGlobalIdentity;
use stratum_core::models::plan::Plan;
use stratum_core::models::role::Role;
use stratum_core::models::user::{CreateUser, UpdateUser, User};
use stratum_core::repository::{
    DirectoryStore, GlobalIdentityRepository, RoleRepository, TenantStore, UserRepository,
};
use stratum_core::scope::Scoped;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::password;
use crate::permission::{PermissionCache, user_list_key};
use crate::validation::{check_email, check_password, check_username};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role_id: u64,
}

/// Updatable user fields. Each one is optional and independently validated
/// before anything is written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces every role the user currently holds.
    pub role_id: Option<u64>,
}

/// Cached list shape. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: u64,
    pub tenant_id: u64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// User management. Every email is also registered in the directory's
/// global identity index so the user can log in.
pub struct UserService<D, K> {
    directory: D,
    permissions: PermissionCache<K>,
    config: AuthConfig,
}

impl<D: DirectoryStore, K: KeyValueCache + Clone> UserService<D, K> {
    pub fn new(directory: D, permissions: PermissionCache<K>, config: AuthConfig) -> Self {
        Self {
            directory,
            permissions,
            config,
        }
    }

    /// Create a user holding `role_id`.
    ///
    /// `plan` is the tenant's plan as preloaded by the directory; its
    /// `max_users` limit is enforced when present.
    pub async fn create_user<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        plan: Option<&Plan>,
        req: CreateUserRequest,
    ) -> StratumResult<User> {
        let username = req.username.trim();
        let email = req.email.trim();
        check_username(username)?;
        check_email(email)?;
        check_password(&req.password, self.config.min_password_length)?;

        let users = db.users();
        if let Some(plan) = plan {
            let current = users.count().await?;
            if !plan.allows_another_user(current) {
                return Err(StratumError::forbidden(format!(
                    "plan '{}' allows at most {} users",
                    plan.name, plan.max_users
                )));
            }
        }
        ensure_unique(&users, Some(username), Some(email), None).await?;
        let role = existing_role(db, req.role_id).await?;

        let password_hash = password::hash_password(&req.password, self.config.pepper.as_deref())?;
        self.register_identity(email, db.tenant_id()).await?;
        let created = users
            .create(CreateUser {
                username: username.into(),
                email: email.into(),
                password_hash,
                is_active: true,
            })
            .await;
        let user = match created {
            Ok(user) => user,
            Err(e) => {
                self.release_identity(email, db.tenant_id()).await;
                return Err(e);
            }
        };
        if let Err(e) = db.roles().assign_to_user(user.id, role.id).await {
            if let Err(cleanup) = users.delete(user.id).await {
                warn!(user_id = user.id, error = %cleanup, "user cleanup failed");
            }
            self.release_identity(email, db.tenant_id()).await;
            return Err(e);
        }

        self.invalidate_list(db.tenant_id()).await;
        info!(tenant_id = db.tenant_id(), user_id = user.id, role = %role.name, "user created");
        Ok(user)
    }

    pub async fn get_user<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
    ) -> StratumResult<User> {
        db.users().get_by_id(user_id).await
    }

    /// Apply `patch`. Nothing is written unless every field passes validation.
    pub async fn update_user<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        user_id: u64,
        patch: UserPatch,
    ) -> StratumResult<User> {
        let users = db.users();
        let existing = users.get_by_id(user_id).await?;

        let username = patch.username.as_deref().map(str::trim);
        let email = patch.email.as_deref().map(str::trim);
        if let Some(username) = username {
            check_username(username)?;
        }
        if let Some(email) = email {
            check_email(email)?;
        }
        ensure_unique(&users, username, email, Some(user_id)).await?;
        let role = match patch.role_id {
            Some(role_id) => Some(existing_role(db, role_id).await?),
            None => None,
        };

        // A new email is reserved in the index before the row changes.
        let new_email = email.filter(|e| !e.eq_ignore_ascii_case(&existing.email));
        if let Some(new_email) = new_email {
            self.register_identity(new_email, db.tenant_id()).await?;
        }

        let user = if username.is_some() || email.is_some() || patch.is_active.is_some() {
            let updated = users
                .update(
                    user_id,
                    UpdateUser {
                        username: username.map(Into::into),
                        email: email.map(Into::into),
                        password_hash: None,
                        is_active: patch.is_active,
                    },
                )
                .await;
            match updated {
                Ok(user) => user,
                Err(e) => {
                    if let Some(new_email) = new_email {
                        self.release_identity(new_email, db.tenant_id()).await;
                    }
                    return Err(e);
                }
            }
        } else {
            existing.clone()
        };
        if new_email.is_some() {
            self.release_identity(&existing.email, db.tenant_id()).await;
        }

        if let Some(role) = role {
            let roles = db.roles();
            let mut held = false;
            for current in roles.get_user_roles(user_id).await? {
                if current.id == role.id {
                    held = true;
                } else {
                    roles.unassign_from_user(user_id, current.id).await?;
                }
            }
            if !held {
                roles.assign_to_user(user_id, role.id).await?;
            }
            self.permissions
                .invalidate_user(db.tenant_id(), user_id)
                .await;
        }

        self.invalidate_list(db.tenant_id()).await;
        Ok(user)
    }

    /// Delete `user_id` on behalf of `actor_id`. Users cannot delete themselves.
    pub async fn delete_user<H: TenantStore>(
        &self,
        db: &Scoped<H>,
        actor_id: u64,
        user_id: u64,
    ) -> StratumResult<()> {
        if actor_id == user_id {
            return Err(StratumError::forbidden("cannot delete your own account"));
        }
        let users = db.users();
        let user = users.get_by_id(user_id).await?;
        users.delete(user_id).await?;
        self.release_identity(&user.email, db.tenant_id()).await;
        self.permissions
            .invalidate_user(db.tenant_id(), user_id)
            .await;
        self.invalidate_list(db.tenant_id()).await;
        info!(tenant_id = db.tenant_id(), user_id, "user deleted");
        Ok(())
    }

    /// Users of the tenant, served from `tenant:{id}:users:list` when cached.
    pub async fn list_users<H: TenantStore>(
        &self,
        db: &Scoped<H>,
    ) -> StratumResult<Vec<UserSummary>> {
        let key = user_list_key(db.tenant_id());
        let cache = self.permissions.cache();
        match get_json::<K, Vec<UserSummary>>(cache, &key).await {
            Ok(Some(users)) => return Ok(users),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "user list cache read failed"),
        }

        let users: Vec<UserSummary> = db.users().list().await?.iter().map(UserSummary::from).collect();
        let ttl = Duration::from_secs(self.config.user_list_ttl_secs);
        if let Err(e) = set_json(cache, &key, &users, ttl).await {
            warn!(key, error = %e, "user list cache write failed");
        }
        Ok(users)
    }

    /// Point `email` at `tenant_id` in the global identity index.
    async fn register_identity(&self, email: &str, tenant_id: u64) -> StratumResult<()> {
        self.directory
            .identities()
            .create(CreateGlobalIdentity {
                email: email.into(),
                tenant_id,
            })
            .await?;
        Ok(())
    }

    async fn release_identity(&self, email: &str, tenant_id: u64) {
        if let Err(e) = self.directory.identities().delete(email, tenant_id).await {
            warn!(tenant_id, error = %e, "global identity cleanup failed");
        }
    }

    async fn invalidate_list(&self, tenant_id: u64) {
        let key = user_list_key(tenant_id);
        if let Err(e) = self.permissions.cache().delete(&key).await {
            warn!(key, error = %e, "user list invalidation failed");
        }
    }
}

async fn existing_role<H: TenantStore>(db: &Scoped<H>, role_id: u64) -> StratumResult<Role> {
    match db.roles().get_by_id(role_id).await {
        Ok(role) => Ok(role),
        Err(e) if e.is_not_found() => Err(StratumError::validation(format!(
            "role {role_id} does not exist"
        ))),
        Err(e) => Err(e),
    }
}

/// Reject a username or email already held by a user other than `except`.
async fn ensure_unique<U: UserRepository>(
    users: &U,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<u64>,
) -> StratumResult<()> {
    if let Some(username) = username {
        match users.get_by_username(username).await {
            Ok(other) if Some(other.id) != except => {
                return Err(StratumError::already_exists("username in this tenant"));
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    if let Some(email) = email {
        match users.get_by_email(email).await {
            Ok(other) if Some(other.id) != except => {
                return Err(StratumError::already_exists("email in this tenant"));
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
