//! Database-specific error types and conversions.

use stratum_core::error::StratumError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}")]
    Conflict { entity: String },

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Invalid database configuration: {0}")]
    Config(String),
}

impl DbError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Map a failed INSERT/UPDATE, turning unique violations into conflicts.
    pub fn on_write(entity: &str) -> impl FnOnce(sqlx::Error) -> DbError + '_ {
        move |err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Conflict {
                entity: entity.into(),
            },
            _ => DbError::Sql(err),
        }
    }
}

fn is_infrastructure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

impl From<DbError> for StratumError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StratumError::NotFound { entity, id },
            DbError::Conflict { entity } => StratumError::AlreadyExists { entity },
            DbError::Sql(sqlx::Error::RowNotFound) => StratumError::not_found("row", "unknown"),
            DbError::Sql(ref e) if is_infrastructure(e) => {
                StratumError::Infrastructure(err.to_string())
            }
            DbError::Sql(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                StratumError::already_exists("record")
            }
            other => StratumError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_retryable() {
        let err: StratumError = DbError::Sql(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn conflicts_map_to_already_exists() {
        let err: StratumError = DbError::Conflict {
            entity: "user".into(),
        }
        .into();
        assert!(matches!(err, StratumError::AlreadyExists { entity } if entity == "user"));
    }

    #[test]
    fn migration_failures_are_not_retryable() {
        let err: StratumError = DbError::Migration("bad ddl".into()).into();
        assert!(!err.is_retryable());
        assert!(matches!(err, StratumError::Database(_)));
    }
}
