use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

use super::models::{AccessDecision, PlanFeature};
use super::service::SubscriptionService;
use super::usage::{period_key, UsageTracker};

/// key: billing-entitlements -> plan snapshot + usage into one decision
#[derive(Clone)]
pub struct EntitlementEvaluator {
    pool: PgPool,
}

impl EntitlementEvaluator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The decision path never raises — a denial is a structured result with
    /// a reason. Store failures still propagate.
    pub async fn check_access(
        &self,
        account_id: Uuid,
        feature_key: &str,
    ) -> AppResult<AccessDecision> {
        let subscriptions = SubscriptionService::new(self.pool.clone());
        let Some(subscription) = subscriptions.active_subscription(account_id).await? else {
            return Ok(denied("no active subscription"));
        };

        let Some(feature) = subscription.feature(feature_key) else {
            return Ok(denied("feature not included in current plan"));
        };

        if feature.is_uncapped() {
            return Ok(AccessDecision {
                has_access: true,
                remaining_usage: -1,
                limit: -1,
                is_unlimited: true,
                message: None,
            });
        }

        let tracker = UsageTracker::new(self.pool.clone());
        let used = tracker
            .usage_for(account_id, feature_key, &period_key(Utc::now()))
            .await?
            .map(|row| row.used_count)
            .unwrap_or(0);

        Ok(evaluate_feature(feature, used))
    }
}

fn denied(message: &str) -> AccessDecision {
    AccessDecision {
        has_access: false,
        remaining_usage: 0,
        limit: 0,
        is_unlimited: false,
        message: Some(message.to_string()),
    }
}

/// Entitlement arithmetic over a snapshot feature and the period's counter.
pub fn evaluate_feature(feature: &PlanFeature, used: i64) -> AccessDecision {
    if feature.is_uncapped() {
        return AccessDecision {
            has_access: true,
            remaining_usage: -1,
            limit: -1,
            is_unlimited: true,
            message: None,
        };
    }

    let remaining = (feature.monthly_limit - used).max(0);
    AccessDecision {
        has_access: remaining > 0,
        remaining_usage: remaining,
        limit: feature.monthly_limit,
        is_unlimited: false,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::evaluate_feature;
    use crate::billing::models::PlanFeature;

    fn capped(limit: i64) -> PlanFeature {
        PlanFeature {
            key: "job_applications".to_string(),
            unlimited: false,
            monthly_limit: limit,
        }
    }

    #[test]
    fn unlimited_always_grants_regardless_of_usage() {
        let feature = PlanFeature {
            key: "portfolio_items".to_string(),
            unlimited: true,
            monthly_limit: 0,
        };
        for used in [0, 10, 1_000_000] {
            let decision = evaluate_feature(&feature, used);
            assert!(decision.has_access);
            assert!(decision.is_unlimited);
            assert_eq!(decision.remaining_usage, -1);
        }
    }

    #[test]
    fn negative_one_limit_counts_as_unlimited() {
        let decision = evaluate_feature(&capped(-1), 500);
        assert!(decision.has_access);
        assert!(decision.is_unlimited);
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let decision = evaluate_feature(&capped(10), 15);
        assert!(!decision.has_access);
        assert_eq!(decision.remaining_usage, 0);
        assert_eq!(decision.limit, 10);
    }

    #[test]
    fn access_tracks_remaining() {
        for (limit, used) in [(10_i64, 0_i64), (10, 9), (10, 10), (3, 2), (1, 1)] {
            let decision = evaluate_feature(&capped(limit), used);
            assert_eq!(decision.remaining_usage, (limit - used).max(0));
            assert_eq!(decision.has_access, decision.remaining_usage > 0);
        }
    }

    #[test]
    fn exhausted_free_tier_is_denied() {
        let decision = evaluate_feature(&capped(10), 10);
        assert!(!decision.has_access);
        assert_eq!(decision.remaining_usage, 0);
    }
}
