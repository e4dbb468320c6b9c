//! sqlx implementation of [`UserRepository`].
//!
//! Password hashing happens before the repository is called; this layer
//! only ever sees Argon2id PHC strings. API keys are stored as SHA-256
//! digests alongside their absolute expiry.

use chrono::{DateTime, Utc};
use sqlx::Any;
use stratum_core::error::StratumResult;
use stratum_core::models::user::{CreateUser, UpdateUser, User};
use stratum_core::repository::UserRepository;
use stratum_core::scope::Scope;

use super::{
    BindScope, db_id, from_db_id, from_opt_timestamp, from_timestamp, insert_returning_id,
    tenant_filter, timestamp,
};
use crate::connection::DbHandle;
use crate::error::DbError;

const USER_COLUMNS: &str = "id, tenant_id, username, email, password_hash, is_active, \
                            api_key_hash, api_key_expires_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    tenant_id: i64,
    username: String,
    email: String,
    password_hash: String,
    is_active: i64,
    api_key_hash: Option<String>,
    api_key_expires_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        Ok(User {
            id: from_db_id(self.id),
            tenant_id: from_db_id(self.tenant_id),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            is_active: self.is_active != 0,
            api_key_hash: self.api_key_hash,
            api_key_expires_at: from_opt_timestamp(self.api_key_expires_at)?,
            created_at: from_timestamp(self.created_at)?,
            updated_at: from_timestamp(self.updated_at)?,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct SqlUserRepository {
    db: DbHandle,
    scope: Scope,
}

impl SqlUserRepository {
    pub fn new(db: DbHandle, scope: Scope) -> Self {
        Self { db, scope }
    }

    async fn fetch_by(&self, column: &str, value: UserKey<'_>) -> Result<Option<User>, DbError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} AND {column} = ?",
            tenant_filter(self.scope, "")
        );
        let query = sqlx::query_as::<Any, UserRow>(&sql).bind_scope(self.scope);
        let query = match value {
            UserKey::Id(id) => query.bind(db_id(id)),
            UserKey::Text(text) => query.bind(text),
        };
        query
            .fetch_optional(self.db.pool())
            .await?
            .map(UserRow::try_into_user)
            .transpose()
    }
}

enum UserKey<'a> {
    Id(u64),
    Text(&'a str),
}

impl UserRepository for SqlUserRepository {
    async fn create(&self, input: CreateUser) -> StratumResult<User> {
        let now = Utc::now().timestamp();
        let query = sqlx::query(
            "INSERT INTO users (tenant_id, username, email, password_hash, is_active, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(db_id(self.scope.tenant_id()))
        .bind(&input.username)
        .bind(normalize_email(&input.email))
        .bind(&input.password_hash)
        .bind(i64::from(input.is_active))
        .bind(now)
        .bind(now);
        let id = insert_returning_id(&self.db, query, "user").await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: u64) -> StratumResult<User> {
        Ok(self
            .fetch_by("id", UserKey::Id(id))
            .await?
            .ok_or_else(|| DbError::not_found("user", id))?)
    }

    async fn get_by_email(&self, email: &str) -> StratumResult<User> {
        let email = normalize_email(email);
        Ok(self
            .fetch_by("email", UserKey::Text(&email))
            .await?
            .ok_or_else(|| DbError::not_found("user", &email))?)
    }

    async fn get_by_username(&self, username: &str) -> StratumResult<User> {
        Ok(self
            .fetch_by("username", UserKey::Text(username))
            .await?
            .ok_or_else(|| DbError::not_found("user", username))?)
    }

    async fn get_by_login(&self, identifier: &str) -> StratumResult<User> {
        let email = normalize_email(identifier);
        if let Some(user) = self.fetch_by("email", UserKey::Text(&email)).await? {
            return Ok(user);
        }
        self.get_by_username(identifier.trim()).await
    }

    async fn get_by_api_key_hash(&self, key_hash: &str) -> StratumResult<User> {
        Ok(self
            .fetch_by("api_key_hash", UserKey::Text(key_hash))
            .await?
            .ok_or_else(|| DbError::not_found("user", "api key"))?)
    }

    async fn update(&self, id: u64, input: UpdateUser) -> StratumResult<User> {
        let mut sets = Vec::new();
        if input.username.is_some() {
            sets.push("username = ?");
        }
        if input.email.is_some() {
            sets.push("email = ?");
        }
        if input.password_hash.is_some() {
            sets.push("password_hash = ?");
        }
        if input.is_active.is_some() {
            sets.push("is_active = ?");
        }
        if sets.is_empty() {
            return self.get_by_id(id).await;
        }
        sets.push("updated_at = ?");

        let sql = format!(
            "UPDATE users SET {} WHERE {} AND id = ?",
            sets.join(", "),
            tenant_filter(self.scope, "")
        );
        let mut query = sqlx::query::<Any>(&sql);
        if let Some(username) = &input.username {
            query = query.bind(username);
        }
        if let Some(email) = &input.email {
            query = query.bind(normalize_email(email));
        }
        if let Some(hash) = &input.password_hash {
            query = query.bind(hash);
        }
        if let Some(active) = input.is_active {
            query = query.bind(i64::from(active));
        }
        let result = query
            .bind(Utc::now().timestamp())
            .bind_scope(self.scope)
            .bind(db_id(id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("user"))?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id).into());
        }
        self.get_by_id(id).await
    }

    async fn set_api_key(
        &self,
        id: u64,
        key_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StratumResult<()> {
        let sql = format!(
            "UPDATE users SET api_key_hash = ?, api_key_expires_at = ?, updated_at = ? \
             WHERE {} AND id = ?",
            tenant_filter(self.scope, "")
        );
        let result = sqlx::query::<Any>(&sql)
            .bind(key_hash)
            .bind(timestamp(expires_at))
            .bind(Utc::now().timestamp())
            .bind_scope(self.scope)
            .bind(db_id(id))
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("api key"))?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id).into());
        }
        Ok(())
    }

    async fn clear_api_key(&self, key_hash: &str) -> StratumResult<bool> {
        let sql = format!(
            "UPDATE users SET api_key_hash = NULL, api_key_expires_at = NULL \
             WHERE {} AND api_key_hash = ?",
            tenant_filter(self.scope, "")
        );
        let result = sqlx::query::<Any>(&sql)
            .bind_scope(self.scope)
            .bind(key_hash)
            .execute(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: u64) -> StratumResult<()> {
        let sql = format!(
            "DELETE FROM users WHERE {} AND id = ?",
            tenant_filter(self.scope, "")
        );
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        let result = sqlx::query::<Any>(&sql)
            .bind_scope(self.scope)
            .bind(db_id(id))
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id).into());
        }
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(db_id(id))
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn count(&self) -> StratumResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM users WHERE {}",
            tenant_filter(self.scope, "")
        );
        let count = sqlx::query_scalar::<Any, i64>(&sql)
            .bind_scope(self.scope)
            .fetch_one(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list(&self) -> StratumResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY id",
            tenant_filter(self.scope, "")
        );
        let rows = sqlx::query_as::<Any, UserRow>(&sql)
            .bind_scope(self.scope)
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<_, _>>()?)
    }
}
