//! Global identity: the email to tenant index consulted at login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maps a globally unique email to exactly one tenant. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalIdentity {
    pub id: u64,
    pub email: String,
    pub tenant_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGlobalIdentity {
    pub email: String,
    pub tenant_id: u64,
}
