use chrono::{DateTime, Duration, Months, Utc};
use serde_json::json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ledger::models::{PaymentMethod, TransactionAction, TransactionDetails, TransactionStatus};

use super::models::{AccountSubscription, PlanAudience, PlanTier, SubscriptionPlan};

/// key: billing-service -> subscription lifecycle
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The account's current subscription: the most recently created row in
    /// `active` or `trial` status. At most one row per account qualifies.
    pub async fn active_subscription(
        &self,
        account_id: Uuid,
    ) -> AppResult<Option<AccountSubscription>> {
        let row = sqlx::query_as::<_, AccountSubscription>(
            r#"
            SELECT * FROM account_subscriptions
            WHERE account_id = $1
              AND status IN ('active', 'trial')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Purchase path. The row snapshots the plan's features at creation;
    /// later plan edits never change it. A reported payment reference
    /// activates immediately, otherwise the row stays `pending` until the
    /// payment is verified.
    pub async fn create_subscription(
        &self,
        account_id: Uuid,
        account_kind: PlanAudience,
        plan_id: Uuid,
        payment_method: Option<PaymentMethod>,
        payment_reference: Option<String>,
    ) -> AppResult<AccountSubscription> {
        if self.active_subscription(account_id).await?.is_some() {
            return Err(AppError::BadRequest(
                "account already has an active subscription".to_string(),
            ));
        }

        let plan = self.load_plan(plan_id).await?;
        if plan.audience != account_kind.as_str() {
            return Err(AppError::BadRequest(format!(
                "plan `{}` is not offered to {} accounts",
                plan.code,
                account_kind.as_str()
            )));
        }

        let tier = plan_tier(&plan)?;
        let now = Utc::now();
        let activated = payment_reference.is_some();
        let status = if activated { "active" } else { "pending" };
        let next_billing = activated.then(|| next_billing_at(now, &plan.billing_period));

        let subscription = sqlx::query_as::<_, AccountSubscription>(
            r#"
            INSERT INTO account_subscriptions (
                id,
                account_id,
                account_kind,
                plan_id,
                plan_code,
                tier,
                status,
                amount_cents,
                currency,
                payment_method,
                auto_renew,
                started_at,
                next_billing_at,
                features
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(account_kind.as_str())
        .bind(plan.id)
        .bind(&plan.code)
        .bind(tier.as_str())
        .bind(status)
        .bind(plan.amount_cents)
        .bind(&plan.currency)
        .bind(payment_method.map(|method| method.as_str()))
        .bind(now)
        .bind(next_billing)
        .bind(&plan.features)
        .fetch_one(&self.pool)
        .await?;

        let ledger_status = if activated {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Pending
        };
        append_subscription_ledger_row(
            &self.pool,
            &subscription,
            &plan,
            TransactionAction::Payment,
            ledger_status,
            payment_method,
            payment_reference.as_deref(),
        )
        .await?;

        Ok(subscription)
    }

    /// Time-boxed trial of a paid plan. The trial carries the paid plan's
    /// full feature snapshot so conversion only has to flip lifecycle state.
    pub async fn start_trial(
        &self,
        account_id: Uuid,
        account_kind: PlanAudience,
        plan_id: Uuid,
    ) -> AppResult<AccountSubscription> {
        if self.active_subscription(account_id).await?.is_some() {
            return Err(AppError::BadRequest(
                "account already has an active subscription".to_string(),
            ));
        }

        let plan = self.load_plan(plan_id).await?;
        if plan.audience != account_kind.as_str() {
            return Err(AppError::BadRequest(format!(
                "plan `{}` is not offered to {} accounts",
                plan.code,
                account_kind.as_str()
            )));
        }
        if !plan.is_trial || plan.trial_days <= 0 {
            return Err(AppError::BadRequest(format!(
                "plan `{}` does not offer a trial",
                plan.code
            )));
        }
        plan_tier(&plan)?;

        let now = Utc::now();
        let trial_ends = now + Duration::days(plan.trial_days as i64);

        let subscription = sqlx::query_as::<_, AccountSubscription>(
            r#"
            INSERT INTO account_subscriptions (
                id,
                account_id,
                account_kind,
                plan_id,
                plan_code,
                tier,
                status,
                amount_cents,
                currency,
                auto_renew,
                started_at,
                trial_ends_at,
                features
            ) VALUES ($1, $2, $3, $4, $5, 'trial', 'trial', $6, $7, FALSE, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(account_kind.as_str())
        .bind(plan.id)
        .bind(&plan.code)
        .bind(plan.amount_cents)
        .bind(&plan.currency)
        .bind(now)
        .bind(trial_ends)
        .bind(&plan.features)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    pub async fn cancel_subscription(&self, account_id: Uuid) -> AppResult<AccountSubscription> {
        let row = sqlx::query_as::<_, AccountSubscription>(
            r#"
            UPDATE account_subscriptions
            SET status = 'cancelled',
                cancelled_at = NOW(),
                auto_renew = FALSE,
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM account_subscriptions
                WHERE account_id = $1
                  AND status IN ('active', 'trial')
                ORDER BY created_at DESC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            AppError::BadRequest("no active subscription to cancel".to_string())
        })
    }

    /// Admin path flipping a `pending` purchase to `active` once its payment
    /// is verified.
    pub async fn activate_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<AccountSubscription> {
        let row = sqlx::query_as::<_, AccountSubscription>(
            r#"
            UPDATE account_subscriptions
            SET status = 'active',
                next_billing_at = NOW() + INTERVAL '1 month',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            AppError::BadRequest("subscription is not awaiting activation".to_string())
        })
    }

    /// key: trial-conversion -> one transaction, two records
    ///
    /// The subscription flip and the payment ledger row commit together or
    /// not at all; this is the only operation here spanning two records.
    pub async fn convert_trial_to_paid(
        &self,
        account_id: Uuid,
        payment_method: PaymentMethod,
        payment_reference: &str,
    ) -> AppResult<AccountSubscription> {
        let mut tx = self.pool.begin().await?;

        let trial = sqlx::query_as::<_, AccountSubscription>(
            r#"
            SELECT * FROM account_subscriptions
            WHERE account_id = $1
              AND status = 'trial'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(trial) = trial else {
            return Err(AppError::BadRequest(
                "no active trial subscription found".to_string(),
            ));
        };

        let plan = sqlx::query_as::<_, SubscriptionPlan>("SELECT * FROM billing_plans WHERE id = $1")
            .bind(trial.plan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::Message(format!("plan {} missing for trial conversion", trial.plan_id))
            })?;

        let tier = plan_tier(&plan)?;
        let now = Utc::now();
        let subscription = sqlx::query_as::<_, AccountSubscription>(
            r#"
            UPDATE account_subscriptions
            SET status = 'active',
                tier = $1,
                amount_cents = $2,
                currency = $3,
                payment_method = $4,
                auto_renew = TRUE,
                trial_ends_at = NULL,
                next_billing_at = $5,
                features = $6,
                updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(tier.as_str())
        .bind(plan.amount_cents)
        .bind(&plan.currency)
        .bind(payment_method.as_str())
        .bind(next_billing_at(now, &plan.billing_period))
        .bind(&plan.features)
        .bind(trial.id)
        .fetch_one(&mut *tx)
        .await?;

        append_subscription_ledger_row(
            &mut *tx,
            &subscription,
            &plan,
            TransactionAction::TrialConversion,
            TransactionStatus::Completed,
            Some(payment_method),
            Some(payment_reference),
        )
        .await?;

        tx.commit().await?;
        Ok(subscription)
    }

    async fn load_plan(&self, plan_id: Uuid) -> AppResult<SubscriptionPlan> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM billing_plans WHERE id = $1 AND active = TRUE",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        plan.ok_or(AppError::NotFound)
    }
}

async fn append_subscription_ledger_row<'e, E>(
    executor: E,
    subscription: &AccountSubscription,
    plan: &SubscriptionPlan,
    action: TransactionAction,
    status: TransactionStatus,
    payment_method: Option<PaymentMethod>,
    payment_reference: Option<&str>,
) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let details = TransactionDetails::Subscription {
        subscription_id: subscription.id,
        account_id: subscription.account_id,
        plan_id: plan.id,
        plan_code: plan.code.clone(),
        tier: plan.tier.clone(),
    };
    let details_json =
        serde_json::to_value(&details).map_err(|err| AppError::Message(err.to_string()))?;
    let metadata = match payment_reference {
        Some(reference) => json!({ "payment_reference": reference }),
        None => json!({}),
    };

    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (
            id,
            entity,
            action,
            status,
            amount_cents,
            currency,
            payment_method,
            account_id,
            details,
            metadata
        ) VALUES ($1, 'subscription', $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(action.as_str())
    .bind(status.as_str())
    .bind(subscription.amount_cents)
    .bind(&subscription.currency)
    .bind(payment_method.map(|method| method.as_str()))
    .bind(subscription.account_id)
    .bind(&details_json)
    .bind(&metadata)
    .execute(executor)
    .await?;

    Ok(())
}

fn plan_tier(plan: &SubscriptionPlan) -> AppResult<PlanTier> {
    PlanTier::parse(&plan.tier).ok_or_else(|| {
        AppError::Message(format!(
            "plan `{}` carries unknown tier `{}`",
            plan.code, plan.tier
        ))
    })
}

fn next_billing_at(from: DateTime<Utc>, billing_period: &str) -> DateTime<Utc> {
    match billing_period {
        "yearly" | "annual" => from.checked_add_months(Months::new(12)).unwrap_or(from),
        _ => from.checked_add_months(Months::new(1)).unwrap_or(from),
    }
}

#[cfg(test)]
mod tests {
    use super::next_billing_at;
    use chrono::{Months, TimeZone, Utc};

    #[test]
    fn monthly_billing_advances_one_month() {
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 8, 0, 0).unwrap();
        assert_eq!(
            next_billing_at(start, "monthly"),
            start.checked_add_months(Months::new(1)).unwrap()
        );
    }

    #[test]
    fn yearly_billing_advances_twelve_months() {
        let start = Utc.with_ymd_and_hms(2026, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_billing_at(start, "yearly"),
            start.checked_add_months(Months::new(12)).unwrap()
        );
    }
}
