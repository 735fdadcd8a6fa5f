//! User repository. Users are created on first contact and never destroyed
//! (spec.md §3); deactivation is modeled as a plan change elsewhere.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tessera_ids::UserId;
use tessera_protocol::domain::{Platform, PlanTier};

use crate::error::Result;
use crate::Pool;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub platform: Platform,
    pub platform_user_id: String,
    pub plan_tier: PlanTier,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub ip: Option<String>,
    pub api_key: Option<String>,
    pub api_key_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

pub async fn find_by_platform_identity(
    pool: &Pool,
    platform: Platform,
    platform_user_id: &str,
) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE platform = $1 AND platform_user_id = $2",
    )
    .bind(platform)
    .bind(platform_user_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn find_by_api_key(pool: &Pool, api_key: &str) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE api_key = $1")
        .bind(api_key)
        .fetch_optional(pool)
        .await?)
}

pub async fn get(pool: &Pool, id: UserId) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Insert a first-contact user on the default free plan (admission §4.2
/// step 1). Races on `(platform, platform_user_id)` are resolved by
/// letting the unique constraint win and falling back to a read.
pub async fn insert_with_default_plan(
    pool: &Pool,
    platform: Platform,
    platform_user_id: &str,
    ip: Option<&str>,
) -> Result<User> {
    let id = UserId::new();
    let row = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, platform, platform_user_id, plan_tier, ip)
        VALUES ($1, $2, $3, 'free', $4)
        ON CONFLICT (platform, platform_user_id) DO UPDATE SET last_active_at = last_active_at
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(platform)
    .bind(platform_user_id)
    .bind(ip)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Record the requesting IP and bump `last_active_at` (§4.2 step 1).
pub async fn touch_last_active(pool: &Pool, id: UserId, ip: Option<&str>) -> Result<()> {
    sqlx::query(
        "UPDATE users SET last_active_at = now(), ip = COALESCE($2, ip) WHERE id = $1",
    )
    .bind(id)
    .bind(ip)
    .execute(pool)
    .await?;
    Ok(())
}
