//! sqlx implementation of [`PlanRepository`].

use chrono::Utc;
use stratum_core::error::StratumResult;
use stratum_core::models::plan::{CreatePlan, Plan, PlanType};
use stratum_core::repository::PlanRepository;

use super::{db_id, from_db_id, from_timestamp, insert_returning_id};
use crate::connection::DbHandle;
use crate::error::DbError;

const PLAN_COLUMNS: &str = "id, name, plan_type, price, max_users, max_products, \
                            storage_limit_mb, is_active, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PlanRow {
    id: i64,
    name: String,
    plan_type: String,
    price: i64,
    max_users: i64,
    max_products: i64,
    storage_limit_mb: i64,
    is_active: i64,
    created_at: i64,
}

impl PlanRow {
    pub(crate) fn try_into_plan(self) -> Result<Plan, DbError> {
        let limit = |value: i64, field: &str| {
            u32::try_from(value).map_err(|_| DbError::Decode(format!("plan {field} out of range")))
        };
        Ok(Plan {
            id: from_db_id(self.id),
            name: self.name,
            plan_type: self.plan_type.parse().map_err(DbError::Decode)?,
            price: self.price,
            max_users: limit(self.max_users, "max_users")?,
            max_products: limit(self.max_products, "max_products")?,
            storage_limit_mb: limit(self.storage_limit_mb, "storage_limit_mb")?,
            is_active: self.is_active != 0,
            created_at: from_timestamp(self.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct SqlPlanRepository {
    db: DbHandle,
}

impl SqlPlanRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl PlanRepository for SqlPlanRepository {
    async fn create(&self, input: CreatePlan) -> StratumResult<Plan> {
        let query = sqlx::query(
            "INSERT INTO plans (name, plan_type, price, max_users, max_products, \
             storage_limit_mb, is_active, created_at) VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&input.name)
        .bind(input.plan_type.as_str())
        .bind(input.price)
        .bind(i64::from(input.max_users))
        .bind(i64::from(input.max_products))
        .bind(i64::from(input.storage_limit_mb))
        .bind(Utc::now().timestamp());
        let id = insert_returning_id(&self.db, query, "plan").await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: u64) -> StratumResult<Plan> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?");
        let row = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(db_id(id))
            .fetch_optional(self.db.pool())
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::not_found("plan", id))?;
        Ok(row.try_into_plan()?)
    }

    async fn get_by_type(&self, plan_type: PlanType) -> StratumResult<Vec<Plan>> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE plan_type = ? ORDER BY id");
        let rows = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(plan_type.as_str())
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(PlanRow::try_into_plan)
            .collect::<Result<_, _>>()?)
    }

    async fn list(&self) -> StratumResult<Vec<Plan>> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY id");
        let rows = sqlx::query_as::<_, PlanRow>(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(PlanRow::try_into_plan)
            .collect::<Result<_, _>>()?)
    }
}
