pub mod api;
pub mod entitlements;
pub mod models;
pub mod plans;
pub mod scheduler;
pub mod service;
pub mod usage;

pub use entitlements::{evaluate_feature, EntitlementEvaluator};
pub use models::{
    AccessDecision, AccountSubscription, FeatureUsage, PlanAudience, PlanFeature, PlanTier,
    SubscriptionPlan, SubscriptionStatus,
};
pub use plans::PlanCatalog;
pub use scheduler::{process_tick as run_expiry_tick, spawn as spawn_expiry_scheduler};
pub use service::SubscriptionService;
pub use usage::{period_key, UsageTracker};
