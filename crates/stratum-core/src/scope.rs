//! Tenant scoping for database handles.
//!
//! Rows in the shared database are disambiguated by a `tenant_id` column.
//! A [`Scoped`] handle remembers which tenant it serves and whether every
//! query must filter on that column.

use crate::models::tenant::Tenant;
use crate::repository::TenantStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    tenant_id: u64,
    filter_rows: bool,
}

impl Scope {
    /// Scope for a tenant living in the shared database: every query is filtered.
    pub fn shared(tenant_id: u64) -> Self {
        Self {
            tenant_id,
            filter_rows: true,
        }
    }

    /// Scope for a physically isolated database. No row filter is applied.
    pub fn isolated(tenant_id: u64) -> Self {
        Self {
            tenant_id,
            filter_rows: false,
        }
    }

    /// Scoping rule for a tenant: shared tenants are filtered, dedicated ones are not.
    pub fn for_tenant(tenant: &Tenant) -> Self {
        if tenant.is_shared() {
            Self::shared(tenant.id)
        } else {
            Self::isolated(tenant.id)
        }
    }

    /// Owner written on every inserted row.
    pub fn tenant_id(&self) -> u64 {
        self.tenant_id
    }

    /// Tenant id every read and write must be restricted to, if any.
    pub fn row_filter(&self) -> Option<u64> {
        self.filter_rows.then_some(self.tenant_id)
    }
}

/// A database handle bound to a tenant scope.
#[derive(Debug, Clone)]
pub struct Scoped<H> {
    handle: H,
    scope: Scope,
}

impl<H> Scoped<H> {
    pub fn new(handle: H, scope: Scope) -> Self {
        Self { handle, scope }
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn tenant_id(&self) -> u64 {
        self.scope.tenant_id
    }

    pub fn into_handle(self) -> H {
        self.handle
    }
}

impl<H: TenantStore> Scoped<H> {
    pub fn users(&self) -> H::Users {
        self.handle.users(self.scope)
    }

    pub fn roles(&self) -> H::Roles {
        self.handle.roles(self.scope)
    }

    pub fn permissions(&self) -> H::Permissions {
        self.handle.permissions()
    }

    pub fn modules(&self) -> H::Modules {
        self.handle.modules()
    }
}

/// Wrap `handle` so every query through it is filtered by `tenant_id`.
///
/// Must be applied to every handle on the shared database.
pub fn scope_for_shared_tenant<H>(handle: H, tenant_id: u64) -> Scoped<H> {
    Scoped::new(handle, Scope::shared(tenant_id))
}
