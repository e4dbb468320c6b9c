//! Tenant domain model.
//!
//! A tenant is an isolated customer account. Its data lives either in a
//! dedicated physical database or in the one shared database, where every
//! row carries the owning tenant's id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::Plan;

/// Physical database strategy of a tenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Shared,
    Dedicated,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Shared => "shared",
            DatabaseType::Dedicated => "dedicated",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(DatabaseType::Shared),
            "dedicated" => Ok(DatabaseType::Dedicated),
            other => Err(format!("unknown database type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: u64,
    pub name: String,
    pub database_type: DatabaseType,
    /// Stored physical database name. Only authoritative for dedicated tenants.
    pub database_name: String,
    pub is_active: bool,
    pub plan_id: Option<u64>,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Physical database holding this tenant's rows.
    ///
    /// Shared tenants always resolve to `shared_database`, whatever name
    /// happens to be stored on the record.
    pub fn actual_database_name<'a>(&'a self, shared_database: &'a str) -> &'a str {
        match self.database_type {
            DatabaseType::Shared => shared_database,
            DatabaseType::Dedicated => &self.database_name,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.database_type == DatabaseType::Shared
    }

    /// A tenant without an expiry date never expires.
    pub fn is_plan_expired(&self, now: DateTime<Utc>) -> bool {
        self.plan_expires_at.is_some_and(|at| at <= now)
    }
}

/// Directory read shape used for routing: the tenant with its plan preloaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantWithPlan {
    pub tenant: Tenant,
    pub plan: Option<Plan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub database_type: DatabaseType,
    pub database_name: String,
    pub plan_id: Option<u64>,
    pub plan_expires_at: Option<DateTime<Utc>>,
}

/// Fields that can be updated on an existing tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    /// `Some(None)` detaches the plan.
    pub plan_id: Option<Option<u64>>,
    pub plan_expires_at: Option<Option<DateTime<Utc>>>,
}

/// Longest database name MySQL accepts.
pub const MAX_DATABASE_NAME_LEN: usize = 64;

/// Lowercase slug used to derive dedicated database names.
///
/// Non-ASCII letters and digits become `x{code point}` so names in other
/// scripts stay distinct. Any other run of characters collapses to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                slug.push_str(&format!("x{:x}", u32::from(lower)));
            }
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Physical database name for a new dedicated tenant, at most
/// [`MAX_DATABASE_NAME_LEN`] characters of `[a-z0-9_]`.
///
/// Distinct names can still collide after slugging or truncation; the
/// directory rejects the second tenant in that case.
pub fn dedicated_database_name(tenant_name: &str) -> String {
    const PREFIX: &str = "tenant_";
    const SUFFIX: &str = "_db";

    let mut slug = slugify(tenant_name);
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug.truncate(MAX_DATABASE_NAME_LEN - PREFIX.len() - SUFFIX.len());
    format!("{PREFIX}{}{SUFFIX}", slug.trim_end_matches('_'))
}
