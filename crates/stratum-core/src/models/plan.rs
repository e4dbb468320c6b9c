//! Subscription plan domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Standard,
    Premium,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Standard => "standard",
            PlanType::Premium => "premium",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanType::Free),
            "standard" => Ok(PlanType::Standard),
            "premium" => Ok(PlanType::Premium),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

/// A subscription plan. Limits of `0` mean unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: u64,
    pub name: String,
    pub plan_type: PlanType,
    /// Price in cents.
    pub price: i64,
    pub max_users: u32,
    pub max_products: u32,
    pub storage_limit_mb: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Whether a tenant already holding `current` users may add another one.
    pub fn allows_another_user(&self, current: u64) -> bool {
        self.max_users == 0 || current < u64::from(self.max_users)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub plan_type: PlanType,
    pub price: i64,
    pub max_users: u32,
    pub max_products: u32,
    pub storage_limit_mb: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(max_users: u32) -> Plan {
        Plan {
            id: 1,
            name: "Free Starter".into(),
            plan_type: PlanType::Free,
            price: 0,
            max_users,
            max_products: 0,
            storage_limit_mb: 100,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn zero_max_users_is_unlimited() {
        assert!(plan(0).allows_another_user(10_000));
    }

    #[test]
    fn max_users_is_an_upper_bound() {
        assert!(plan(3).allows_another_user(2));
        assert!(!plan(3).allows_another_user(3));
    }

    #[test]
    fn plan_type_parses_its_own_rendering() {
        for t in [PlanType::Free, PlanType::Standard, PlanType::Premium] {
            assert_eq!(t.as_str().parse::<PlanType>().unwrap(), t);
        }
        assert!("gold".parse::<PlanType>().is_err());
    }
}
