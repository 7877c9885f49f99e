use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ledger::models::PaymentMethod;

use super::entitlements::EntitlementEvaluator;
use super::models::{AccessDecision, AccountSubscription, FeatureUsage, PlanAudience, SubscriptionPlan};
use super::plans::PlanCatalog;
use super::service::SubscriptionService;
use super::usage::UsageTracker;

/// key: billing-api -> rest endpoints
pub fn routes() -> Router {
    Router::new()
        .route("/api/billing/plans", get(list_plans))
        .route("/api/billing/plans/:code", get(get_plan))
        .route(
            "/api/billing/accounts/:account_id/subscription",
            get(get_subscription),
        )
        .route("/api/billing/accounts/:account_id/subscribe", post(subscribe))
        .route("/api/billing/accounts/:account_id/trial", post(start_trial))
        .route(
            "/api/billing/accounts/:account_id/trial/convert",
            post(convert_trial),
        )
        .route("/api/billing/accounts/:account_id/cancel", post(cancel))
        .route(
            "/api/billing/accounts/:account_id/access/:feature",
            get(check_access),
        )
        .route("/api/billing/accounts/:account_id/usage", post(track_usage))
        .route(
            "/api/billing/subscriptions/:subscription_id/activate",
            post(activate),
        )
}

#[derive(Debug, Deserialize)]
pub struct PlanListQuery {
    pub audience: Option<String>,
}

async fn list_plans(
    Extension(pool): Extension<PgPool>,
    Query(params): Query<PlanListQuery>,
) -> AppResult<Json<Vec<SubscriptionPlan>>> {
    let audience = match params.audience.as_deref() {
        Some(raw) => Some(PlanAudience::parse(raw).ok_or_else(|| {
            AppError::BadRequest(format!("unknown audience `{raw}`"))
        })?),
        None => None,
    };
    let catalog = PlanCatalog::new(pool);
    Ok(Json(catalog.list_active(audience).await?))
}

async fn get_plan(
    Extension(pool): Extension<PgPool>,
    Path(code): Path<String>,
) -> AppResult<Json<SubscriptionPlan>> {
    let catalog = PlanCatalog::new(pool);
    let plan = catalog.by_code(&code).await?.ok_or(AppError::NotFound)?;
    Ok(Json(plan))
}

async fn get_subscription(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<Option<AccountSubscription>>> {
    let service = SubscriptionService::new(pool);
    Ok(Json(service.active_subscription(account_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_id: Uuid,
    pub account_kind: PlanAudience,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
}

async fn subscribe(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<Json<AccountSubscription>> {
    let service = SubscriptionService::new(pool);
    let subscription = service
        .create_subscription(
            account_id,
            payload.account_kind,
            payload.plan_id,
            payload.payment_method,
            payload.payment_reference,
        )
        .await?;
    Ok(Json(subscription))
}

#[derive(Debug, Deserialize)]
pub struct StartTrialRequest {
    pub plan_id: Uuid,
    pub account_kind: PlanAudience,
}

async fn start_trial(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<StartTrialRequest>,
) -> AppResult<Json<AccountSubscription>> {
    let service = SubscriptionService::new(pool);
    let subscription = service
        .start_trial(account_id, payload.account_kind, payload.plan_id)
        .await?;
    Ok(Json(subscription))
}

#[derive(Debug, Deserialize)]
pub struct ConvertTrialRequest {
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
}

async fn convert_trial(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<ConvertTrialRequest>,
) -> AppResult<Json<AccountSubscription>> {
    let service = SubscriptionService::new(pool);
    let subscription = service
        .convert_trial_to_paid(account_id, payload.payment_method, &payload.payment_reference)
        .await?;
    Ok(Json(subscription))
}

async fn cancel(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<AccountSubscription>> {
    let service = SubscriptionService::new(pool);
    Ok(Json(service.cancel_subscription(account_id).await?))
}

async fn activate(
    Extension(pool): Extension<PgPool>,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<AccountSubscription>> {
    let service = SubscriptionService::new(pool);
    Ok(Json(service.activate_subscription(subscription_id).await?))
}

async fn check_access(
    Extension(pool): Extension<PgPool>,
    Path((account_id, feature)): Path<(Uuid, String)>,
) -> AppResult<Json<AccessDecision>> {
    let evaluator = EntitlementEvaluator::new(pool);
    Ok(Json(evaluator.check_access(account_id, &feature).await?))
}

#[derive(Debug, Deserialize)]
pub struct TrackUsageRequest {
    pub feature: String,
    pub amount: Option<i64>,
}

async fn track_usage(
    Extension(pool): Extension<PgPool>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<TrackUsageRequest>,
) -> AppResult<Json<FeatureUsage>> {
    let tracker = UsageTracker::new(pool);
    let usage = tracker
        .track_usage(account_id, &payload.feature, payload.amount.unwrap_or(1))
        .await?;
    Ok(Json(usage))
}
