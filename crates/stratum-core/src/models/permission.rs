//! Permission domain model.

use serde::{Deserialize, Serialize};

/// Wildcard permission satisfying every check.
pub const ADMIN_FULL: &str = "admin:full";

/// A globally named capability of the form `resource:action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub id: u64,
    /// `resource:action`, e.g. `product:create`.
    pub name: String,
    pub description: String,
    /// The `resource` half of the name.
    pub category: String,
    pub module_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub name: String,
    pub description: String,
    pub category: String,
    pub module_id: Option<u64>,
}

impl CreatePermission {
    /// Category defaults to the resource half of the name.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            category: category_of(&name).to_string(),
            name,
            description: description.into(),
            module_id: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn in_module(mut self, module_id: u64) -> Self {
        self.module_id = Some(module_id);
        self
    }
}

impl From<&Permission> for CreatePermission {
    fn from(p: &Permission) -> Self {
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            category: p.category.clone(),
            module_id: p.module_id,
        }
    }
}

pub fn category_of(name: &str) -> &str {
    name.split_once(':').map_or(name, |(resource, _)| resource)
}
