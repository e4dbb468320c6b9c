//! sqlx repository implementations.
//!
//! Tenant-scoped repositories carry their [`Scope`]. Every statement they
//! issue starts its `WHERE` clause with [`tenant_filter`] and binds the
//! scope first with [`BindScope::bind_scope`], so rows belonging to another
//! tenant of the shared database are never visible.

mod global_identity;
mod module;
mod permission;
mod plan;
mod role;
mod tenant;
mod user;

use chrono::{DateTime, Utc};
use sqlx::Any;
use sqlx::any::AnyArguments;
use sqlx::query::{Query, QueryAs, QueryScalar};
use stratum_core::repository::{DirectoryStore, TenantStore};
use stratum_core::scope::Scope;

pub use global_identity::SqlGlobalIdentityRepository;
pub use module::SqlModuleRepository;
pub use permission::SqlPermissionRepository;
pub use plan::SqlPlanRepository;
pub use role::SqlRoleRepository;
pub use tenant::SqlTenantRepository;
pub use user::SqlUserRepository;

use crate::connection::{DbHandle, Dialect};
use crate::error::DbError;

// Ids come from auto-increment columns and never exceed i64::MAX.
pub(crate) fn db_id(id: u64) -> i64 {
    id as i64
}

pub(crate) fn from_db_id(id: i64) -> u64 {
    id as u64
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn from_timestamp(secs: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DbError::Decode(format!("timestamp out of range: {secs}")))
}

pub(crate) fn from_opt_timestamp(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, DbError> {
    secs.map(from_timestamp).transpose()
}

/// Run an INSERT and return the generated id.
///
/// The `Any` driver reports `last_insert_id` for MySQL only, so SQLite reads
/// `last_insert_rowid()` on the connection that ran the INSERT.
pub(crate) async fn insert_returning_id<'q>(
    db: &DbHandle,
    query: Query<'q, Any, AnyArguments<'q>>,
    entity: &str,
) -> Result<u64, DbError> {
    let mut conn = db.pool().acquire().await?;
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(DbError::on_write(entity))?;
    let id = match db.dialect() {
        Dialect::MySql => result
            .last_insert_id()
            .ok_or_else(|| DbError::Decode(format!("{entity} insert returned no id")))?,
        Dialect::Sqlite => {
            sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
                .fetch_one(&mut *conn)
                .await?
        }
    };
    Ok(from_db_id(id))
}

/// Leading `WHERE` predicate for a scoped statement.
///
/// `alias` qualifies the column (`"u."`), or is empty for single-table queries.
pub(crate) fn tenant_filter(scope: Scope, alias: &str) -> String {
    match scope.row_filter() {
        Some(_) => format!("{alias}tenant_id = ?"),
        None => "1 = 1".to_string(),
    }
}

/// Binds the tenant id consumed by [`tenant_filter`], if the scope has one.
pub(crate) trait BindScope: Sized {
    fn bind_scope(self, scope: Scope) -> Self;
}

impl<'q> BindScope for Query<'q, Any, AnyArguments<'q>> {
    fn bind_scope(self, scope: Scope) -> Self {
        match scope.row_filter() {
            Some(tenant_id) => self.bind(db_id(tenant_id)),
            None => self,
        }
    }
}

impl<'q, O> BindScope for QueryAs<'q, Any, O, AnyArguments<'q>> {
    fn bind_scope(self, scope: Scope) -> Self {
        match scope.row_filter() {
            Some(tenant_id) => self.bind(db_id(tenant_id)),
            None => self,
        }
    }
}

impl<'q, O> BindScope for QueryScalar<'q, Any, O, AnyArguments<'q>> {
    fn bind_scope(self, scope: Scope) -> Self {
        match scope.row_filter() {
            Some(tenant_id) => self.bind(db_id(tenant_id)),
            None => self,
        }
    }
}

impl TenantStore for DbHandle {
    type Users = SqlUserRepository;
    type Roles = SqlRoleRepository;
    type Permissions = SqlPermissionRepository;
    type Modules = SqlModuleRepository;

    fn users(&self, scope: Scope) -> SqlUserRepository {
        SqlUserRepository::new(self.clone(), scope)
    }

    fn roles(&self, scope: Scope) -> SqlRoleRepository {
        SqlRoleRepository::new(self.clone(), scope)
    }

    fn permissions(&self) -> SqlPermissionRepository {
        SqlPermissionRepository::new(self.clone())
    }

    fn modules(&self) -> SqlModuleRepository {
        SqlModuleRepository::new(self.clone())
    }
}

impl DirectoryStore for DbHandle {
    type Plans = SqlPlanRepository;
    type Tenants = SqlTenantRepository;
    type Identities = SqlGlobalIdentityRepository;

    fn plans(&self) -> SqlPlanRepository {
        SqlPlanRepository::new(self.clone())
    }

    fn tenants(&self) -> SqlTenantRepository {
        SqlTenantRepository::new(self.clone())
    }

    fn identities(&self) -> SqlGlobalIdentityRepository {
        SqlGlobalIdentityRepository::new(self.clone())
    }
}
