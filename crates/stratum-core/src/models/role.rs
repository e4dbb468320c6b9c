//! Role domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SUPER_ADMINISTRATOR: &str = "Super Administrator";
pub const TENANT_ADMIN: &str = "Tenant Admin";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub tenant_id: u64,
    pub name: String,
    pub description: String,
    /// System roles cannot have their permissions edited through normal APIs.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub description: String,
    pub is_system: bool,
}
