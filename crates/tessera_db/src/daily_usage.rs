//! Daily usage repository. One row per `(user, UTC date)`, created lazily
//! on first chargeable event (spec.md §3) and mutated under an upsert
//! discipline (`INSERT ... ON CONFLICT DO UPDATE`).

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use tessera_ids::UserId;
use tessera_protocol::domain::Capability;

use crate::error::Result;
use crate::Pool;

#[derive(Debug, Clone, FromRow)]
pub struct DailyUsage {
    pub user_id: UserId,
    pub usage_date: NaiveDate,
    pub tokens_used: Decimal,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub tokens_image: Decimal,
    pub tokens_video: Decimal,
    pub tokens_text: Decimal,
    pub tokens_audio: Decimal,
}

/// Today's usage row, or a zeroed view if none exists yet. Used by the
/// admission service's quota check (§4.2 step 7) and by `GET
/// /api/v1/user/me`, neither of which should cause a row to spring into
/// existence just by reading.
pub async fn fetch_for_date(pool: &Pool, user_id: UserId, date: NaiveDate) -> Result<DailyUsage> {
    let existing = sqlx::query_as::<_, DailyUsage>(
        "SELECT * FROM daily_usage WHERE user_id = $1 AND usage_date = $2",
    )
    .bind(user_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    Ok(existing.unwrap_or(DailyUsage {
        user_id,
        usage_date: date,
        tokens_used: Decimal::ZERO,
        jobs_completed: 0,
        jobs_failed: 0,
        tokens_image: Decimal::ZERO,
        tokens_video: Decimal::ZERO,
        tokens_text: Decimal::ZERO,
        tokens_audio: Decimal::ZERO,
    }))
}

pub async fn history(pool: &Pool, user_id: UserId, limit: i64) -> Result<Vec<DailyUsage>> {
    Ok(sqlx::query_as::<_, DailyUsage>(
        "SELECT * FROM daily_usage WHERE user_id = $1 ORDER BY usage_date DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

fn capability_column(capability: Capability) -> &'static str {
    match capability {
        Capability::Image => "tokens_image",
        Capability::Video => "tokens_video",
        Capability::Text => "tokens_text",
        Capability::Audio => "tokens_audio",
    }
}

/// Charge a completed job's cost to today's usage row, upserting it into
/// existence if this is the user's first chargeable event of the day
/// (spec.md §4.4). Done in the same transaction as the job's COMPLETED
/// transition.
pub async fn charge_completed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: UserId,
    capability: Capability,
    cost_tokens: Decimal,
) -> Result<()> {
    let date = Utc::now().date_naive();
    let column = capability_column(capability);
    let sql = format!(
        r#"
        INSERT INTO daily_usage (id, user_id, usage_date, tokens_used, jobs_completed, {column})
        VALUES (gen_random_uuid(), $1, $2, $3, 1, $3)
        ON CONFLICT (user_id, usage_date) DO UPDATE SET
            tokens_used = daily_usage.tokens_used + EXCLUDED.tokens_used,
            jobs_completed = daily_usage.jobs_completed + 1,
            {column} = daily_usage.{column} + EXCLUDED.{column}
        "#
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(date)
        .bind(cost_tokens)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Record a failed job against today's usage row without charging tokens
/// (spec.md §4.4: "Tokens are NOT charged").
pub async fn charge_failed(pool: &Pool, user_id: UserId) -> Result<()> {
    let date = Utc::now().date_naive();
    sqlx::query(
        r#"
        INSERT INTO daily_usage (id, user_id, usage_date, jobs_failed)
        VALUES (gen_random_uuid(), $1, $2, 1)
        ON CONFLICT (user_id, usage_date) DO UPDATE SET
            jobs_failed = daily_usage.jobs_failed + 1
        "#,
    )
    .bind(user_id)
    .bind(date)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_columns_cover_all_variants() {
        assert_eq!(capability_column(Capability::Image), "tokens_image");
        assert_eq!(capability_column(Capability::Audio), "tokens_audio");
    }
}
