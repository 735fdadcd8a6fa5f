//! Plan repository. Plan rows are immutable policy records (spec.md §3);
//! tier upgrades are modeled as changing a user's `plan_tier`, never by
//! mutating a plan row in place.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tessera_protocol::domain::PlanTier;

use crate::error::{DbError, Result};
use crate::Pool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub tier: PlanTier,
    pub daily_token_limit: i64,
    pub requests_per_minute: i32,
    pub max_concurrent_jobs: i32,
    pub priority: i32,
    pub max_resolution: i32,
    pub allowed_models: sqlx::types::Json<Vec<String>>,
    pub price_cents: i32,
    pub description: String,
    pub active: bool,
}

impl Plan {
    /// `model == "*"` in `allowed_models` denotes "all models" (spec.md §3).
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models
            .0
            .iter()
            .any(|m| m == "*" || m == model)
    }
}

pub async fn fetch(pool: &Pool, tier: PlanTier) -> Result<Plan> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE tier = $1")
        .bind(tier)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::not_found(format!("plan {tier:?}")))
}

pub async fn list(pool: &Pool) -> Result<Vec<Plan>> {
    Ok(sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY priority DESC")
        .fetch_all(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(models: &[&str]) -> Plan {
        Plan {
            tier: PlanTier::Free,
            daily_token_limit: 20,
            requests_per_minute: 10,
            max_concurrent_jobs: 2,
            priority: 0,
            max_resolution: 1024,
            allowed_models: sqlx::types::Json(models.iter().map(|s| s.to_string()).collect()),
            price_cents: 0,
            description: String::new(),
            active: true,
        }
    }

    #[test]
    fn wildcard_allows_any_model() {
        assert!(plan(&["*"]).allows_model("sdxl"));
    }

    #[test]
    fn explicit_list_rejects_unlisted_model() {
        assert!(plan(&["sdxl"]).allows_model("sdxl"));
        assert!(!plan(&["sdxl"]).allows_model("flux-schnell"));
    }
}
