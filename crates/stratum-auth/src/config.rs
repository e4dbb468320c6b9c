//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Configuration for credentials and the caches layered over them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Absolute API key lifetime in seconds (default: 600 = 10 minutes).
    pub api_key_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Permission-set cache TTL in seconds (default: 600).
    pub permission_ttl_secs: u64,
    /// Tenant record cache TTL in seconds (default: 1800).
    pub tenant_info_ttl_secs: u64,
    /// Per-tenant user list cache TTL in seconds (default: 300).
    pub user_list_ttl_secs: u64,
    /// Tenant whose users live in the directory database. Set after seeding.
    pub system_tenant_id: Option<u64>,
    /// Try every tenant database when an email has no global identity.
    /// O(#tenants); off by default.
    pub tenant_scan_fallback: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_lifetime_secs: 600,
            pepper: None,
            min_password_length: 8,
            permission_ttl_secs: 600,
            tenant_info_ttl_secs: 1800,
            user_list_ttl_secs: 300,
            system_tenant_id: None,
            tenant_scan_fallback: false,
        }
    }
}

impl AuthConfig {
    pub fn is_system_tenant(&self, tenant_id: u64) -> bool {
        self.system_tenant_id == Some(tenant_id)
    }
}
