//! sqlx implementation of [`PermissionRepository`].
//!
//! The permission catalog is global to a physical database and is not
//! tenant-filtered. Grants to roles live in [`SqlRoleRepository`](super::SqlRoleRepository).

use stratum_core::error::StratumResult;
use stratum_core::models::permission::{CreatePermission, Permission};
use stratum_core::repository::PermissionRepository;

use super::{db_id, from_db_id};
use crate::connection::DbHandle;
use crate::error::DbError;

pub(crate) const PERMISSION_COLUMNS: &str = "id, name, description, category, module_id";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PermissionRow {
    id: i64,
    name: String,
    description: String,
    category: String,
    module_id: Option<i64>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: from_db_id(row.id),
            name: row.name,
            description: row.description,
            category: row.category,
            module_id: row.module_id.map(from_db_id),
        }
    }
}

#[derive(Clone)]
pub struct SqlPermissionRepository {
    db: DbHandle,
}

impl SqlPermissionRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl PermissionRepository for SqlPermissionRepository {
    async fn create(&self, input: CreatePermission) -> StratumResult<Permission> {
        sqlx::query(
            "INSERT INTO permissions (name, description, category, module_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.module_id.map(db_id))
        .execute(self.db.pool())
        .await
        .map_err(DbError::on_write("permission"))?;
        self.get_by_name(&input.name).await
    }

    async fn get_by_id(&self, id: u64) -> StratumResult<Permission> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?");
        let row = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(db_id(id))
            .fetch_optional(self.db.pool())
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::not_found("permission", id))?;
        Ok(row.into())
    }

    async fn get_by_name(&self, name: &str) -> StratumResult<Permission> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = ?");
        let row = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(name)
            .fetch_optional(self.db.pool())
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::not_found("permission", name))?;
        Ok(row.into())
    }

    async fn list(&self) -> StratumResult<Vec<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY id");
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn list_by_categories(&self, categories: &[&str]) -> StratumResult<Vec<Permission>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; categories.len()].join(", ");
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE category IN ({placeholders}) \
             ORDER BY id"
        );
        let mut query = sqlx::query_as::<_, PermissionRow>(&sql);
        for category in categories {
            query = query.bind(*category);
        }
        let rows = query
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }
}
