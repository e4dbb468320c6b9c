//! Schema definitions and migration runner.
//!
//! Each migration lists the schema kinds it applies to, so the directory,
//! tenant and system databases share one ordered history. `{pk}` in a
//! statement expands to the dialect's auto-increment primary key. Every
//! statement is `CREATE TABLE IF NOT EXISTS`, so re-running is safe.

use std::collections::HashSet;

use chrono::Utc;
use stratum_core::router::SchemaKind;
use tracing::info;

use crate::connection::DbHandle;
use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS _migration (
    version BIGINT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at BIGINT NOT NULL
)";

struct Migration {
    version: i64,
    name: &'static str,
    kinds: &'static [SchemaKind],
    statements: &'static [&'static str],
}

const ALL: &[SchemaKind] = &[SchemaKind::Directory, SchemaKind::Tenant, SchemaKind::System];

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "directory",
        kinds: &[SchemaKind::Directory],
        statements: DIRECTORY_V1,
    },
    Migration {
        version: 2,
        name: "catalog_rbac_users",
        kinds: ALL,
        statements: RBAC_V1,
    },
    Migration {
        version: 3,
        name: "business",
        kinds: &[SchemaKind::Tenant],
        statements: BUSINESS_V1,
    },
];

// -----------------------------------------------------------------------
// Directory: plans, tenants and the global identity index
// -----------------------------------------------------------------------

const DIRECTORY_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS plans (
    id {pk},
    name VARCHAR(255) NOT NULL UNIQUE,
    plan_type VARCHAR(32) NOT NULL,
    price BIGINT NOT NULL DEFAULT 0,
    max_users BIGINT NOT NULL DEFAULT 0,
    max_products BIGINT NOT NULL DEFAULT 0,
    storage_limit_mb BIGINT NOT NULL DEFAULT 0,
    is_active BIGINT NOT NULL DEFAULT 1,
    created_at BIGINT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS tenants (
    id {pk},
    name VARCHAR(255) NOT NULL UNIQUE,
    database_type VARCHAR(16) NOT NULL,
    database_name VARCHAR(64) NOT NULL,
    dedicated_database VARCHAR(64) NULL UNIQUE,
    is_active BIGINT NOT NULL DEFAULT 1,
    plan_id BIGINT NULL,
    plan_expires_at BIGINT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS global_identities (
    id {pk},
    email VARCHAR(255) NOT NULL UNIQUE,
    tenant_id BIGINT NOT NULL,
    created_at BIGINT NOT NULL
)",
];

// -----------------------------------------------------------------------
// Catalog, RBAC and users: present in every database
// -----------------------------------------------------------------------

const RBAC_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS modules (
    id {pk},
    name VARCHAR(255) NOT NULL UNIQUE,
    description TEXT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS permissions (
    id {pk},
    name VARCHAR(255) NOT NULL UNIQUE,
    description TEXT NOT NULL,
    category VARCHAR(64) NOT NULL,
    module_id BIGINT NULL
)",
    "CREATE TABLE IF NOT EXISTS roles (
    id {pk},
    tenant_id BIGINT NOT NULL,
    name VARCHAR(255) NOT NULL,
    description TEXT NOT NULL,
    is_system BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    UNIQUE (tenant_id, name)
)",
    "CREATE TABLE IF NOT EXISTS users (
    id {pk},
    tenant_id BIGINT NOT NULL,
    username VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    is_active BIGINT NOT NULL DEFAULT 1,
    api_key_hash VARCHAR(64) NULL UNIQUE,
    api_key_expires_at BIGINT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    UNIQUE (tenant_id, username),
    UNIQUE (tenant_id, email)
)",
    "CREATE TABLE IF NOT EXISTS user_roles (
    user_id BIGINT NOT NULL,
    role_id BIGINT NOT NULL,
    PRIMARY KEY (user_id, role_id)
)",
    "CREATE TABLE IF NOT EXISTS role_permissions (
    role_id BIGINT NOT NULL,
    permission_id BIGINT NOT NULL,
    PRIMARY KEY (role_id, permission_id)
)",
];

// -----------------------------------------------------------------------
// Business tables: regular tenant databases only
// -----------------------------------------------------------------------

const BUSINESS_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS categories (
    id {pk},
    tenant_id BIGINT NOT NULL,
    name VARCHAR(255) NOT NULL,
    description TEXT NOT NULL,
    created_at BIGINT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS products (
    id {pk},
    tenant_id BIGINT NOT NULL,
    category_id BIGINT NULL,
    name VARCHAR(255) NOT NULL,
    sku VARCHAR(64) NOT NULL,
    price BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS inventory (
    id {pk},
    tenant_id BIGINT NOT NULL,
    product_id BIGINT NOT NULL,
    quantity BIGINT NOT NULL DEFAULT 0,
    updated_at BIGINT NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS audit_logs (
    id {pk},
    tenant_id BIGINT NOT NULL,
    user_id BIGINT NULL,
    action VARCHAR(255) NOT NULL,
    details TEXT NOT NULL,
    created_at BIGINT NOT NULL
)",
];

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run every pending migration that applies to `kind`.
///
/// Creates the `_migration` tracking table on first run. Migrations already
/// recorded are skipped, so a database that was migrated as the directory
/// is already complete as the system database.
pub async fn run_migrations(db: &DbHandle, kind: SchemaKind) -> Result<(), DbError> {
    sqlx::raw_sql(MIGRATION_TABLE_DDL)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::Migration(format!("migration table: {e}")))?;

    let applied: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT version FROM _migration")
        .fetch_all(db.pool())
        .await?
        .into_iter()
        .collect();

    for migration in MIGRATIONS {
        if !migration.kinds.contains(&kind) || applied.contains(&migration.version) {
            continue;
        }
        info!(
            database = db.database(),
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        for statement in migration.statements {
            let ddl = statement.replace("{pk}", db.dialect().primary_key());
            sqlx::raw_sql(&ddl).execute(db.pool()).await.map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;
        }

        sqlx::query("INSERT INTO _migration (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now().timestamp())
            .execute(db.pool())
            .await
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Names of the tables a database of `kind` carries after migration.
pub fn expected_tables(kind: SchemaKind) -> Vec<&'static str> {
    MIGRATIONS
        .iter()
        .filter(|m| m.kinds.contains(&kind))
        .flat_map(|m| m.statements.iter())
        .filter_map(|s| {
            s.strip_prefix("CREATE TABLE IF NOT EXISTS ")
                .and_then(|rest| rest.split_whitespace().next())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn system_databases_skip_business_tables() {
        let system = expected_tables(SchemaKind::System);
        assert!(system.contains(&"roles"));
        assert!(system.contains(&"users"));
        assert!(!system.contains(&"products"));
        assert!(!system.contains(&"tenants"));
    }

    #[test]
    fn tenant_databases_carry_business_tables() {
        let tenant = expected_tables(SchemaKind::Tenant);
        for table in ["categories", "products", "inventory", "audit_logs", "role_permissions"] {
            assert!(tenant.contains(&table), "missing {table}");
        }
        assert!(!tenant.contains(&"global_identities"));
    }

    #[test]
    fn directory_carries_the_identity_index() {
        let directory = expected_tables(SchemaKind::Directory);
        assert!(directory.contains(&"global_identities"));
        assert!(directory.contains(&"plans"));
        assert!(directory.contains(&"permissions"));
    }
}
