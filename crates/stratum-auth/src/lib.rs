//! Stratum Auth: password hashing, API-key credentials, permission
//! caching, RBAC and user management, tenant provisioning and the
//! per-request authentication pipeline.

pub mod api_key;
pub mod config;
pub mod error;
pub mod password;
pub mod permission;
pub mod pipeline;
pub mod rbac;
pub mod service;
pub mod tenant;
pub mod users;
pub mod validation;

pub use config::AuthConfig;
pub use error::AuthError;
pub use permission::PermissionCache;
pub use pipeline::RequestPipeline;
pub use rbac::RbacService;
pub use service::{AuthService, Authenticated, LoginOutput};
pub use tenant::{CacheStats, CreateTenantRequest, ProvisionedTenant, TenantService};
pub use users::{CreateUserRequest, UserPatch, UserService, UserSummary};
