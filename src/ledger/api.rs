use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

use super::migrate::{migrate_legacy_transaction, LegacyTransaction};
use super::models::{
    BatchOutcome, LedgerTransaction, TransactionAction, TransactionFilter, TransactionPage,
    TransactionStats, TransactionStatus,
};
use super::service::{
    AdvertisementTransactionInput, BonusTransactionInput, BookingTransactionInput,
    CommissionTransactionInput, LedgerService, LoyaltyTransactionInput, PayoutTransactionInput,
    PenaltyTransactionInput, RefundTransactionInput, SubscriptionTransactionInput,
    SystemTransactionInput,
};

/// key: ledger-api -> rest endpoints
pub fn routes() -> Router {
    Router::new()
        .route(
            "/api/ledger/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route("/api/ledger/transactions/:id", get(get_transaction))
        .route("/api/ledger/transactions/:id/verify", post(verify_transaction))
        .route("/api/ledger/transactions/:id/reject", post(reject_transaction))
        .route(
            "/api/ledger/transactions/verify-batch",
            post(verify_batch),
        )
        .route("/api/ledger/stats", get(stats))
        .route("/api/ledger/migrate", post(migrate_batch))
}

/// Entity-tagged create payload; each variant reuses the typed constructor
/// input so a missing required field fails at deserialization.
#[derive(Debug, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum CreateTransactionInput {
    Booking(BookingTransactionInput),
    Subscription(SubscriptionTransactionInput),
    Payout(PayoutTransactionInput),
    Advertisement(AdvertisementTransactionInput),
    Commission(CommissionTransactionInput),
    Refund(RefundTransactionInput),
    Loyalty(LoyaltyTransactionInput),
    Penalty(PenaltyTransactionInput),
    Bonus(BonusTransactionInput),
    System(SystemTransactionInput),
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(flatten)]
    pub input: CreateTransactionInput,
    pub action: TransactionAction,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
}

async fn create_transaction(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<CreateTransactionRequest>,
) -> AppResult<Json<LedgerTransaction>> {
    let service = LedgerService::new(pool);
    let action = payload.action;
    let status = payload.status.unwrap_or(TransactionStatus::Pending);

    let row = match payload.input {
        CreateTransactionInput::Booking(input) => {
            service.create_booking_transaction(input, action, status).await?
        }
        CreateTransactionInput::Subscription(input) => {
            service
                .create_subscription_transaction(input, action, status)
                .await?
        }
        CreateTransactionInput::Payout(input) => {
            service.create_payout_transaction(input, action, status).await?
        }
        CreateTransactionInput::Advertisement(input) => {
            service
                .create_advertisement_transaction(input, action, status)
                .await?
        }
        CreateTransactionInput::Commission(input) => {
            service
                .create_commission_transaction(input, action, status)
                .await?
        }
        CreateTransactionInput::Refund(input) => {
            service.create_refund_transaction(input, action, status).await?
        }
        CreateTransactionInput::Loyalty(input) => {
            service.create_loyalty_transaction(input, action).await?
        }
        CreateTransactionInput::Penalty(input) => {
            service.create_penalty_transaction(input, action, status).await?
        }
        CreateTransactionInput::Bonus(input) => {
            service.create_bonus_transaction(input, action, status).await?
        }
        CreateTransactionInput::System(input) => {
            service.create_system_transaction(input, action, status).await?
        }
    };

    Ok(Json(row))
}

// Query extraction cannot flatten the filter struct, so the fields are
// spelled out here and folded back into a TransactionFilter.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub entity: Option<super::models::TransactionEntity>,
    pub action: Option<TransactionAction>,
    pub status: Option<TransactionStatus>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub payment_method: Option<super::models::PaymentMethod>,
    pub min_amount_cents: Option<i64>,
    pub max_amount_cents: Option<i64>,
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub page_size: Option<i64>,
    pub cursor: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> TransactionFilter {
        TransactionFilter {
            entity: self.entity,
            action: self.action,
            status: self.status,
            client_id: self.client_id,
            provider_id: self.provider_id,
            account_id: self.account_id,
            payment_method: self.payment_method,
            min_amount_cents: self.min_amount_cents,
            max_amount_cents: self.max_amount_cents,
            start: self.start,
            end: self.end,
        }
    }
}

async fn list_transactions(
    Extension(pool): Extension<PgPool>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<TransactionPage>> {
    let service = LedgerService::new(pool);
    let page = service
        .get_transactions(&params.filter(), params.page_size, params.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

async fn get_transaction(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LedgerTransaction>> {
    let service = LedgerService::new(pool);
    Ok(Json(service.get_transaction(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub admin_id: Uuid,
    pub note: Option<String>,
}

async fn verify_transaction(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyRequest>,
) -> AppResult<Json<LedgerTransaction>> {
    let service = LedgerService::new(pool);
    let row = service
        .verify_transaction(id, payload.admin_id, payload.note)
        .await?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub admin_id: Uuid,
    pub reason: String,
}

async fn reject_transaction(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> AppResult<Json<LedgerTransaction>> {
    let service = LedgerService::new(pool);
    let row = service
        .reject_transaction(id, payload.admin_id, payload.reason)
        .await?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct VerifyBatchRequest {
    pub ids: Vec<Uuid>,
    pub admin_id: Uuid,
}

async fn verify_batch(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<VerifyBatchRequest>,
) -> AppResult<Json<BatchOutcome>> {
    let service = LedgerService::new(pool);
    Ok(Json(service.verify_batch(payload.ids, payload.admin_id).await))
}

async fn stats(
    Extension(pool): Extension<PgPool>,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<TransactionStats>> {
    let service = LedgerService::new(pool);
    Ok(Json(service.transaction_stats(&filter).await?))
}

#[derive(Debug, Serialize)]
pub struct MigrateOutcome {
    pub migrated: Vec<Uuid>,
    pub failed: Vec<MigrateFailure>,
}

#[derive(Debug, Serialize)]
pub struct MigrateFailure {
    pub index: usize,
    pub error: String,
}

/// Backfill endpoint: each legacy record is adapted and inserted
/// independently; a record that fails to map is reported, never skipped
/// silently.
async fn migrate_batch(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<Vec<LegacyTransaction>>,
) -> AppResult<Json<MigrateOutcome>> {
    let service = LedgerService::new(pool);
    let mut outcome = MigrateOutcome {
        migrated: Vec::new(),
        failed: Vec::new(),
    };

    for (index, legacy) in payload.iter().enumerate() {
        let result = match migrate_legacy_transaction(legacy) {
            Ok(migrated) => service.import_migrated(migrated).await.map(|row| row.id),
            Err(err) => Err(crate::error::AppError::BadRequest(err.to_string())),
        };
        match result {
            Ok(id) => outcome.migrated.push(id),
            Err(err) => outcome.failed.push(MigrateFailure {
                index,
                error: err.to_string(),
            }),
        }
    }

    Ok(Json(outcome))
}
