//! sqlx implementation of [`ModuleRepository`].

use stratum_core::error::StratumResult;
use stratum_core::models::module::{CreateModule, Module};
use stratum_core::repository::ModuleRepository;

use super::from_db_id;
use crate::connection::DbHandle;
use crate::error::DbError;

#[derive(Debug, sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    name: String,
    description: String,
}

impl From<ModuleRow> for Module {
    fn from(row: ModuleRow) -> Self {
        Module {
            id: from_db_id(row.id),
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(Clone)]
pub struct SqlModuleRepository {
    db: DbHandle,
}

impl SqlModuleRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl ModuleRepository for SqlModuleRepository {
    async fn create(&self, input: CreateModule) -> StratumResult<Module> {
        sqlx::query("INSERT INTO modules (name, description) VALUES (?, ?)")
            .bind(&input.name)
            .bind(&input.description)
            .execute(self.db.pool())
            .await
            .map_err(DbError::on_write("module"))?;
        self.get_by_name(&input.name).await
    }

    async fn get_by_name(&self, name: &str) -> StratumResult<Module> {
        let row = sqlx::query_as::<_, ModuleRow>(
            "SELECT id, name, description FROM modules WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DbError::not_found("module", name))?;
        Ok(row.into())
    }

    async fn list(&self) -> StratumResult<Vec<Module>> {
        let rows = sqlx::query_as::<_, ModuleRow>("SELECT id, name, description FROM modules ORDER BY id")
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Module::from).collect())
    }
}
