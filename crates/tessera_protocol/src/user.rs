//! User and usage DTOs for the `/api/v1/user/*` surface.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tessera_ids::UserId;

use crate::domain::{Capability, Platform, PlanTier};

/// Response to `GET /api/v1/user/me`.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: UserId,
    pub platform: Platform,
    pub plan: PlanTier,
    pub daily_token_limit: i64,
    pub tokens_used_today: Decimal,
    pub requests_per_minute: i32,
    pub max_concurrent_jobs: i32,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// One day's usage row as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct DailyUsageView {
    pub usage_date: NaiveDate,
    pub tokens_used: Decimal,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub breakdown: CapabilityBreakdown,
}

/// Per-capability token breakdown. Invariant: the four fields sum to
/// `tokens_used` on the same row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityBreakdown {
    pub image: Decimal,
    pub video: Decimal,
    pub text: Decimal,
    pub audio: Decimal,
}

impl CapabilityBreakdown {
    pub fn total(&self) -> Decimal {
        self.image + self.video + self.text + self.audio
    }

    pub fn add(&mut self, capability: Capability, amount: Decimal) {
        match capability {
            Capability::Image => self.image += amount,
            Capability::Video => self.video += amount,
            Capability::Text => self.text += amount,
            Capability::Audio => self.audio += amount,
        }
    }
}

/// Response to `GET /api/v1/user/usage`.
#[derive(Debug, Clone, Serialize)]
pub struct UsageHistoryResponse {
    pub days: Vec<DailyUsageView>,
}

/// One entry in `GET /api/v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub capability: Capability,
    pub resident: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_total_matches_sum_of_parts() {
        let mut breakdown = CapabilityBreakdown::default();
        breakdown.add(Capability::Image, Decimal::new(100, 2));
        breakdown.add(Capability::Text, Decimal::new(50, 2));
        assert_eq!(breakdown.total(), Decimal::new(150, 2));
    }
}
