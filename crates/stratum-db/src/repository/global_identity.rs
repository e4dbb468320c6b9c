//! sqlx implementation of [`GlobalIdentityRepository`].

use chrono::Utc;
use stratum_core::error::StratumResult;
use stratum_core::models::global_identity::{CreateGlobalIdentity, GlobalIdentity};
use stratum_core::repository::GlobalIdentityRepository;

use super::{db_id, from_db_id, from_timestamp};
use crate::connection::DbHandle;
use crate::error::DbError;

#[derive(Debug, sqlx::FromRow)]
struct GlobalIdentityRow {
    id: i64,
    email: String,
    tenant_id: i64,
    created_at: i64,
}

impl GlobalIdentityRow {
    fn try_into_identity(self) -> Result<GlobalIdentity, DbError> {
        Ok(GlobalIdentity {
            id: from_db_id(self.id),
            email: self.email,
            tenant_id: from_db_id(self.tenant_id),
            created_at: from_timestamp(self.created_at)?,
        })
    }
}

/// Emails are matched case-insensitively by storing them lowercased.
fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct SqlGlobalIdentityRepository {
    db: DbHandle,
}

impl SqlGlobalIdentityRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl GlobalIdentityRepository for SqlGlobalIdentityRepository {
    async fn create(&self, input: CreateGlobalIdentity) -> StratumResult<GlobalIdentity> {
        let email = normalize(&input.email);
        sqlx::query("INSERT INTO global_identities (email, tenant_id, created_at) VALUES (?, ?, ?)")
            .bind(&email)
            .bind(db_id(input.tenant_id))
            .bind(Utc::now().timestamp())
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("global identity"))?;
        self.get_by_email(&email).await
    }

    async fn get_by_email(&self, email: &str) -> StratumResult<GlobalIdentity> {
        let row = sqlx::query_as::<_, GlobalIdentityRow>(
            "SELECT id, email, tenant_id, created_at FROM global_identities WHERE email = ?",
        )
        .bind(normalize(email))
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DbError::not_found("global identity", email))?;
        Ok(row.try_into_identity()?)
    }

    async fn delete(&self, email: &str, tenant_id: u64) -> StratumResult<bool> {
        let result = sqlx::query("DELETE FROM global_identities WHERE email = ? AND tenant_id = ?")
            .bind(normalize(email))
            .bind(db_id(tenant_id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
