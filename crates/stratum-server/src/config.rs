//! Layered server configuration.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use stratum_auth::AuthConfig;
use stratum_cache::CacheConfig;
use stratum_db::DbConfig;

pub const CONFIG_FILE: &str = "stratum.yaml";
pub const ENV_PREFIX: &str = "STRATUM_";

/// Super-admin account ensured at every start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "superadmin".into(),
            email: "superadmin@system.com".into(),
            password: "Admin123!".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub admin: AdminConfig,
}

impl ServerConfig {
    /// Defaults, then `path` if it exists, then `STRATUM_*` variables
    /// (`__` separates nested keys, e.g. `STRATUM_DB__SERVER_URL`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
