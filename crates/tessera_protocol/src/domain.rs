//! Enumerations shared by the data model: frontends, capabilities, job
//! status, plan tiers, and artifact kinds.

use serde::{Deserialize, Serialize};

/// Platform a user's identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Discord,
    Web,
}

/// Origin of a job request. `Api` covers direct API usage outside any bot
/// framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frontend {
    Telegram,
    Discord,
    Web,
    Api,
}

/// Kind of generation work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Image,
    Video,
    Text,
    Audio,
}

impl Capability {
    /// `capability_avg_seconds` tunable used by the admission service's
    /// time estimate (§4.2 step 10).
    pub const fn avg_seconds(self) -> u32 {
        match self {
            Capability::Image => 20,
            Capability::Video => 30,
            Capability::Text => 5,
            Capability::Audio => 10,
        }
    }
}

/// Job lifecycle state. `Created` is transient: it is never observed
/// outside the admission transaction that writes it and immediately
/// advances it to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// A terminal job's state never changes again.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Subscription tier. Ordering is `Admin > Pro > Starter > Free`, matching
/// the `priority` column (`free=0, starter=1, pro=2, admin=3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Admin,
}

impl PlanTier {
    /// Canonical priority used to snapshot a job's dispatch priority at
    /// admission time.
    pub const fn priority(self) -> i32 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Starter => 1,
            PlanTier::Pro => 2,
            PlanTier::Admin => 3,
        }
    }
}

/// Kind of output an artifact represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Image,
    Video,
    Audio,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_priority_matches_canonical_ordering() {
        assert!(PlanTier::Admin.priority() > PlanTier::Pro.priority());
        assert!(PlanTier::Pro.priority() > PlanTier::Starter.priority());
        assert!(PlanTier::Starter.priority() > PlanTier::Free.priority());
    }

    #[test]
    fn only_completed_failed_cancelled_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Created.is_terminal());
    }
}
