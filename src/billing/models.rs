use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// key: billing-models -> plans,subscriptions,usage

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAudience {
    Provider,
    Client,
}

impl PlanAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAudience::Provider => "provider",
            PlanAudience::Client => "client",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "provider" => Some(PlanAudience::Provider),
            "client" => Some(PlanAudience::Client),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Trial,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Trial => "trial",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(PlanTier::Free),
            "trial" => Some(PlanTier::Trial),
            "pro" => Some(PlanTier::Pro),
            "premium" => Some(PlanTier::Premium),
            _ => None,
        }
    }
}

/// Subscription lifecycle. `cancelled` and `expired` are terminal; a new
/// subscription row is created to reactivate an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Trial,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "trial" => Some(SubscriptionStatus::Trial),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

/// A metered capability inside a plan. `unlimited` or a `-1` limit means the
/// feature is never counted against a cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    pub key: String,
    #[serde(default)]
    pub unlimited: bool,
    #[serde(default)]
    pub monthly_limit: i64,
}

impl PlanFeature {
    pub fn is_uncapped(&self) -> bool {
        self.unlimited || self.monthly_limit == -1
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub audience: String,
    pub tier: String,
    pub amount_cents: i64,
    pub currency: String,
    pub billing_period: String,
    pub features: Json<Vec<PlanFeature>>,
    pub is_trial: bool,
    pub trial_days: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: billing-subscription-model -> per-account record with feature snapshot
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountSubscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub account_kind: String,
    pub plan_id: Uuid,
    pub plan_code: String,
    pub tier: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub auto_renew: bool,
    pub started_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub features: Json<Vec<PlanFeature>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountSubscription {
    pub fn is_current(&self) -> bool {
        matches!(
            SubscriptionStatus::parse(&self.status),
            Some(SubscriptionStatus::Active) | Some(SubscriptionStatus::Trial)
        )
    }

    /// Looks up a feature inside the snapshot taken at subscription creation.
    pub fn feature(&self, key: &str) -> Option<&PlanFeature> {
        self.features.0.iter().find(|feature| feature.key == key)
    }
}

/// key: billing-usage-model -> one row per account+period+feature
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub id: Uuid,
    pub account_id: Uuid,
    pub subscription_id: Uuid,
    pub period_key: String,
    pub feature_key: String,
    pub used_count: i64,
    pub limit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured outcome of an entitlement check. The query path never raises;
/// a denial carries a human-readable message instead.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub has_access: bool,
    pub remaining_usage: i64,
    pub limit: i64,
    pub is_unlimited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
