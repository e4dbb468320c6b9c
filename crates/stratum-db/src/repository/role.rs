//! sqlx implementation of [`RoleRepository`].
//!
//! Covers roles, their permission grants and user role assignments.
//! Every operation first checks that the role (and user) belong to the
//! repository's scope, so ids from another tenant read as not found.

use chrono::Utc;
use sqlx::Any;
use stratum_core::error::StratumResult;
use stratum_core::models::permission::Permission;
use stratum_core::models::role::{CreateRole, Role};
use stratum_core::repository::RoleRepository;
use stratum_core::scope::Scope;

use super::permission::PermissionRow;
use super::{BindScope, db_id, from_db_id, from_timestamp, insert_returning_id, tenant_filter};
use crate::connection::DbHandle;
use crate::error::DbError;

const ROLE_COLUMNS: &str = "r.id, r.tenant_id, r.name, r.description, r.is_system, \
                            r.created_at, r.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    id: i64,
    tenant_id: i64,
    name: String,
    description: String,
    is_system: i64,
    created_at: i64,
    updated_at: i64,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, DbError> {
        Ok(Role {
            id: from_db_id(self.id),
            tenant_id: from_db_id(self.tenant_id),
            name: self.name,
            description: self.description,
            is_system: self.is_system != 0,
            created_at: from_timestamp(self.created_at)?,
            updated_at: from_timestamp(self.updated_at)?,
        })
    }
}

fn into_roles(rows: Vec<RoleRow>) -> Result<Vec<Role>, DbError> {
    rows.into_iter().map(RoleRow::try_into_role).collect()
}

#[derive(Clone)]
pub struct SqlRoleRepository {
    db: DbHandle,
    scope: Scope,
}

impl SqlRoleRepository {
    pub fn new(db: DbHandle, scope: Scope) -> Self {
        Self { db, scope }
    }

    async fn fetch_role(&self, column: &str, value: RoleKey<'_>) -> Result<Option<Role>, DbError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE {} AND r.{column} = ?",
            tenant_filter(self.scope, "r.")
        );
        let query = sqlx::query_as::<Any, RoleRow>(&sql).bind_scope(self.scope);
        let query = match value {
            RoleKey::Id(id) => query.bind(db_id(id)),
            RoleKey::Name(name) => query.bind(name),
        };
        query
            .fetch_optional(self.db.pool())
            .await?
            .map(RoleRow::try_into_role)
            .transpose()
    }

    async fn require_role(&self, role_id: u64) -> Result<Role, DbError> {
        self.fetch_role("id", RoleKey::Id(role_id))
            .await?
            .ok_or_else(|| DbError::not_found("role", role_id))
    }

    async fn require_user(&self, user_id: u64) -> Result<(), DbError> {
        let sql = format!(
            "SELECT COUNT(*) FROM users WHERE {} AND id = ?",
            tenant_filter(self.scope, "")
        );
        let count = sqlx::query_scalar::<Any, i64>(&sql)
            .bind_scope(self.scope)
            .bind(db_id(user_id))
            .fetch_one(self.db.pool())
            .await?;
        if count == 0 {
            return Err(DbError::not_found("user", user_id));
        }
        Ok(())
    }
}

enum RoleKey<'a> {
    Id(u64),
    Name(&'a str),
}

impl RoleRepository for SqlRoleRepository {
    async fn create(&self, input: CreateRole) -> StratumResult<Role> {
        let now = Utc::now().timestamp();
        let query = sqlx::query(
            "INSERT INTO roles (tenant_id, name, description, is_system, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(db_id(self.scope.tenant_id()))
        .bind(&input.name)
        .bind(&input.description)
        .bind(i64::from(input.is_system))
        .bind(now)
        .bind(now);
        let id = insert_returning_id(&self.db, query, "role").await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: u64) -> StratumResult<Role> {
        Ok(self.require_role(id).await?)
    }

    async fn get_by_name(&self, name: &str) -> StratumResult<Role> {
        Ok(self
            .fetch_role("name", RoleKey::Name(name))
            .await?
            .ok_or_else(|| DbError::not_found("role", name))?)
    }

    async fn list(&self) -> StratumResult<Vec<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE {} ORDER BY r.id",
            tenant_filter(self.scope, "r.")
        );
        let rows = sqlx::query_as::<Any, RoleRow>(&sql)
            .bind_scope(self.scope)
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(into_roles(rows)?)
    }

    async fn set_permissions(&self, role_id: u64, permission_ids: &[u64]) -> StratumResult<()> {
        self.require_role(role_id).await?;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(db_id(role_id))
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        for permission_id in permission_ids {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
                .bind(db_id(role_id))
                .bind(db_id(*permission_id))
                .execute(&mut *tx)
                .await
                .map_err(DbError::on_write("role permission"))?;
        }
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn grant_permission(&self, role_id: u64, permission_id: u64) -> StratumResult<()> {
        self.require_role(role_id).await?;
        let result = sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
            .bind(db_id(role_id))
            .bind(db_id(permission_id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("role permission"));
        match result {
            // Granting twice is a no-op.
            Ok(_) | Err(DbError::Conflict { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn revoke_permission(&self, role_id: u64, permission_id: u64) -> StratumResult<()> {
        self.require_role(role_id).await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
            .bind(db_id(role_id))
            .bind(db_id(permission_id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    async fn get_role_permissions(&self, role_id: u64) -> StratumResult<Vec<Permission>> {
        self.require_role(role_id).await?;
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT p.id, p.name, p.description, p.category, p.module_id FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = ? ORDER BY p.id",
        )
        .bind(db_id(role_id))
        .fetch_all(self.db.pool())
        .await
        .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn assign_to_user(&self, user_id: u64, role_id: u64) -> StratumResult<()> {
        self.require_user(user_id).await?;
        self.require_role(role_id).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(db_id(user_id))
            .bind(db_id(role_id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("role assignment"))?;
        Ok(())
    }

    async fn unassign_from_user(&self, user_id: u64, role_id: u64) -> StratumResult<()> {
        self.require_user(user_id).await?;
        self.require_role(role_id).await?;
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(db_id(user_id))
            .bind(db_id(role_id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("role assignment", format!("{user_id}/{role_id}")).into());
        }
        Ok(())
    }

    async fn get_user_roles(&self, user_id: u64) -> StratumResult<Vec<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             JOIN users u ON u.id = ur.user_id \
             WHERE {} AND u.id = ? AND u.tenant_id = r.tenant_id ORDER BY r.id",
            tenant_filter(self.scope, "r.")
        );
        let rows = sqlx::query_as::<Any, RoleRow>(&sql)
            .bind_scope(self.scope)
            .bind(db_id(user_id))
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(into_roles(rows)?)
    }

    async fn user_permission_names(&self, user_id: u64) -> StratumResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT p.name FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN roles r ON r.id = rp.role_id \
             JOIN user_roles ur ON ur.role_id = r.id \
             JOIN users u ON u.id = ur.user_id \
             WHERE {} AND u.id = ? AND u.tenant_id = r.tenant_id ORDER BY p.name",
            tenant_filter(self.scope, "r.")
        );
        let names = sqlx::query_scalar::<Any, String>(&sql)
            .bind_scope(self.scope)
            .bind(db_id(user_id))
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(names)
    }
}
