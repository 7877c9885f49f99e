use chrono::{DateTime, Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::models::FeatureUsage;
use super::service::SubscriptionService;

/// Year-month accounting window, e.g. `2026-08`. Immutable once a usage row
/// is created under it.
pub fn period_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// key: billing-usage-tracker -> per-period counters
#[derive(Clone)]
pub struct UsageTracker {
    pool: PgPool,
}

impl UsageTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds `amount` to the account's counter for `feature_key` in the current
    /// period. Requires a current subscription; its absence is a caller error.
    /// Not idempotent — exactly-once invocation per real-world event is the
    /// caller's contract.
    pub async fn track_usage(
        &self,
        account_id: Uuid,
        feature_key: &str,
        amount: i64,
    ) -> AppResult<FeatureUsage> {
        if amount <= 0 {
            return Err(AppError::BadRequest(
                "usage amount must be positive".to_string(),
            ));
        }

        let subscriptions = SubscriptionService::new(self.pool.clone());
        let subscription = subscriptions
            .active_subscription(account_id)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("no active subscription for account {account_id}"))
            })?;

        let feature = subscription.feature(feature_key).ok_or_else(|| {
            AppError::BadRequest(format!(
                "feature `{feature_key}` is not included in plan `{}`",
                subscription.plan_code
            ))
        })?;
        let limit = if feature.is_uncapped() {
            -1
        } else {
            feature.monthly_limit
        };

        // The first call in a period seeds the row with the limit snapshot in
        // force; later calls only touch the counter. The increment itself is
        // atomic at the store.
        let row = sqlx::query_as::<_, FeatureUsage>(
            r#"
            INSERT INTO feature_usage (
                id,
                account_id,
                subscription_id,
                period_key,
                feature_key,
                used_count,
                limit_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_id, period_key, feature_key)
            DO UPDATE SET
                used_count = feature_usage.used_count + EXCLUDED.used_count,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(subscription.id)
        .bind(period_key(Utc::now()))
        .bind(feature_key)
        .bind(amount)
        .bind(limit)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn usage_for(
        &self,
        account_id: Uuid,
        feature_key: &str,
        period: &str,
    ) -> AppResult<Option<FeatureUsage>> {
        let row = sqlx::query_as::<_, FeatureUsage>(
            r#"
            SELECT * FROM feature_usage
            WHERE account_id = $1
              AND feature_key = $2
              AND period_key = $3
            "#,
        )
        .bind(account_id)
        .bind(feature_key)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::period_key;
    use chrono::TimeZone;

    #[test]
    fn period_key_is_year_month() {
        let march = chrono::Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(period_key(march), "2026-03");

        let december = chrono::Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(period_key(december), "2025-12");
    }
}
