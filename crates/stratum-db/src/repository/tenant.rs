//! sqlx implementation of [`TenantRepository`].

use chrono::Utc;
use stratum_core::error::StratumResult;
use stratum_core::models::tenant::{CreateTenant, DatabaseType, Tenant, TenantWithPlan, UpdateTenant};
use stratum_core::repository::{PlanRepository, TenantRepository};

use super::plan::SqlPlanRepository;
use super::{
    db_id, from_db_id, from_opt_timestamp, from_timestamp, insert_returning_id, timestamp,
};
use crate::connection::DbHandle;
use crate::error::DbError;

const TENANT_COLUMNS: &str = "id, name, database_type, database_name, is_active, plan_id, \
                              plan_expires_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: i64,
    name: String,
    database_type: String,
    database_name: String,
    is_active: i64,
    plan_id: Option<i64>,
    plan_expires_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TenantRow {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: from_db_id(self.id),
            name: self.name,
            database_type: self.database_type.parse().map_err(DbError::Decode)?,
            database_name: self.database_name,
            is_active: self.is_active != 0,
            plan_id: self.plan_id.map(from_db_id),
            plan_expires_at: from_opt_timestamp(self.plan_expires_at)?,
            created_at: from_timestamp(self.created_at)?,
            updated_at: from_timestamp(self.updated_at)?,
        })
    }
}

/// Directory access for tenant records. No caching of its own.
#[derive(Clone)]
pub struct SqlTenantRepository {
    db: DbHandle,
}

impl SqlTenantRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    async fn fetch_one(&self, filter: &str, value: FilterValue<'_>) -> Result<Option<Tenant>, DbError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE {filter} = ?");
        let query = sqlx::query_as::<_, TenantRow>(&sql);
        let query = match value {
            FilterValue::Id(id) => query.bind(db_id(id)),
            FilterValue::Text(text) => query.bind(text),
        };
        query
            .fetch_optional(self.db.pool())
            .await?
            .map(TenantRow::try_into_tenant)
            .transpose()
    }
}

enum FilterValue<'a> {
    Id(u64),
    Text(&'a str),
}

impl TenantRepository for SqlTenantRepository {
    async fn create(&self, input: CreateTenant) -> StratumResult<Tenant> {
        // NULL for shared tenants; the UNIQUE column rejects a second
        // dedicated tenant on the same physical database.
        let dedicated = (input.database_type == DatabaseType::Dedicated)
            .then_some(input.database_name.as_str());
        let now = Utc::now().timestamp();
        let query = sqlx::query(
            "INSERT INTO tenants (name, database_type, database_name, dedicated_database, \
             is_active, plan_id, plan_expires_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?)",
        )
        .bind(&input.name)
        .bind(input.database_type.as_str())
        .bind(&input.database_name)
        .bind(dedicated)
        .bind(input.plan_id.map(db_id))
        .bind(input.plan_expires_at.map(timestamp))
        .bind(now)
        .bind(now);
        let id = insert_returning_id(&self.db, query, "tenant").await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: u64) -> StratumResult<Tenant> {
        Ok(self
            .fetch_one("id", FilterValue::Id(id))
            .await?
            .ok_or_else(|| DbError::not_found("tenant", id))?)
    }

    async fn get_with_plan(&self, id: u64) -> StratumResult<TenantWithPlan> {
        let tenant = self.get_by_id(id).await?;
        let plan = match tenant.plan_id {
            Some(plan_id) => match SqlPlanRepository::new(self.db.clone()).get_by_id(plan_id).await {
                Ok(plan) => Some(plan),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        Ok(TenantWithPlan { tenant, plan })
    }

    async fn get_by_name(&self, name: &str) -> StratumResult<Tenant> {
        Ok(self
            .fetch_one("name", FilterValue::Text(name))
            .await?
            .ok_or_else(|| DbError::not_found("tenant", name))?)
    }

    async fn list(&self) -> StratumResult<Vec<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id");
        let rows = sqlx::query_as::<_, TenantRow>(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(TenantRow::try_into_tenant)
            .collect::<Result<_, _>>()?)
    }

    async fn update(&self, id: u64, input: UpdateTenant) -> StratumResult<Tenant> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = ?");
        }
        if input.plan_id.is_some() {
            sets.push("plan_id = ?");
        }
        if input.plan_expires_at.is_some() {
            sets.push("plan_expires_at = ?");
        }
        if sets.is_empty() {
            return self.get_by_id(id).await;
        }
        sets.push("updated_at = ?");

        let sql = format!("UPDATE tenants SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(name) = &input.name {
            query = query.bind(name);
        }
        if let Some(plan_id) = input.plan_id {
            query = query.bind(plan_id.map(db_id));
        }
        if let Some(expires_at) = input.plan_expires_at {
            query = query.bind(expires_at.map(timestamp));
        }
        let result = query
            .bind(Utc::now().timestamp())
            .bind(db_id(id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("tenant"))?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("tenant", id).into());
        }
        self.get_by_id(id).await
    }

    async fn set_active(&self, id: u64, active: bool) -> StratumResult<Tenant> {
        let result = sqlx::query("UPDATE tenants SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(active))
            .bind(Utc::now().timestamp())
            .bind(db_id(id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("tenant", id).into());
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: u64) -> StratumResult<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(db_id(id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("tenant", id).into());
        }
        Ok(())
    }
}
