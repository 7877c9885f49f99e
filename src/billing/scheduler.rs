use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};

use crate::config;

use super::models::SubscriptionStatus;

/// key: billing-expiry-scheduler -> overdue subscription sweep
pub fn spawn(pool: PgPool) {
    let interval = TokioDuration::from_secs(*config::BILLING_EXPIRY_SCAN_INTERVAL_SECS);
    let grace_days = *config::BILLING_EXPIRY_GRACE_DAYS;

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&pool, Utc::now(), grace_days).await {
                warn!(?err, "subscription expiry tick failed");
            }
        }
    });
}

/// key: billing-expiry-scheduler -> tick handler
///
/// Marks as `expired` every current subscription whose trial end, explicit
/// end, or billing due date passed more than `grace_days` ago. Each row is
/// handled independently; one failure never aborts the sweep.
pub async fn process_tick(pool: &PgPool, now: DateTime<Utc>, grace_days: i64) -> Result<()> {
    let grace = Duration::days(grace_days);
    let candidates = sqlx::query_as::<_, ExpiryCandidate>(
        r#"
        SELECT id, account_id, status, trial_ends_at, ends_at, next_billing_at
        FROM account_subscriptions
        WHERE status IN ('active', 'trial')
        "#,
    )
    .fetch_all(pool)
    .await?;

    for candidate in candidates {
        let deadline = match SubscriptionStatus::parse(&candidate.status) {
            Some(SubscriptionStatus::Trial) => candidate.trial_ends_at,
            _ => candidate.ends_at.or(candidate.next_billing_at),
        };
        let Some(deadline) = deadline else {
            continue;
        };
        if deadline + grace >= now {
            continue;
        }

        let result = sqlx::query(
            r#"
            UPDATE account_subscriptions
            SET status = 'expired',
                ends_at = COALESCE(ends_at, $1),
                updated_at = NOW()
            WHERE id = $2
              AND status = $3
            "#,
        )
        .bind(now)
        .bind(candidate.id)
        .bind(&candidate.status)
        .execute(pool)
        .await;

        match result {
            Ok(outcome) if outcome.rows_affected() > 0 => {
                info!(
                    subscription = %candidate.id,
                    account = %candidate.account_id,
                    previous_status = %candidate.status,
                    "subscription expired by sweep"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(
                ?err,
                subscription = %candidate.id,
                "failed to expire overdue subscription"
            ),
        }
    }

    Ok(())
}

#[derive(Debug, FromRow)]
struct ExpiryCandidate {
    id: uuid::Uuid,
    account_id: uuid::Uuid,
    status: String,
    trial_ends_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    next_billing_at: Option<DateTime<Utc>>,
}
