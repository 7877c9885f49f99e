use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::warn;
use uuid::Uuid;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::notifications::{LedgerNotification, LoggingDispatcher, NotificationDispatcher};

use super::migrate::MigratedTransaction;
use super::models::{
    BatchFailure, BatchOutcome, LedgerTransaction, PaymentMethod, StatBucket, TransactionAction,
    TransactionDetails, TransactionFilter, TransactionPage, TransactionStats, TransactionStatus,
};

/// key: ledger-service -> append-mostly store over ledger_transactions
#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingTransactionInput {
    pub booking_id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionTransactionInput {
    pub subscription_id: Uuid,
    pub account_id: Uuid,
    pub plan_id: Uuid,
    pub plan_code: String,
    pub tier: String,
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutTransactionInput {
    pub provider_id: Uuid,
    pub payout_method: String,
    pub account_reference: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertisementTransactionInput {
    pub provider_id: Uuid,
    pub ad_id: Uuid,
    pub campaign_name: Option<String>,
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionTransactionInput {
    pub partner_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub commission_rate: f64,
    pub job_value_cents: i64,
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundTransactionInput {
    pub original_transaction_id: Uuid,
    pub client_id: Option<Uuid>,
    pub refund_reason: String,
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyTransactionInput {
    pub account_id: Uuid,
    pub points: i64,
    pub reason: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PenaltyTransactionInput {
    pub account_id: Uuid,
    pub reason: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BonusTransactionInput {
    pub account_id: Uuid,
    pub reason: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemTransactionInput {
    pub reason: String,
    pub reference: Option<String>,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dispatcher: Arc::new(LoggingDispatcher),
        }
    }

    pub fn with_dispatcher(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    pub async fn create_booking_transaction(
        &self,
        input: BookingTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Booking {
            booking_id: input.booking_id,
            client_id: input.client_id,
            provider_id: input.provider_id,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            Some(input.payment_method),
            input.metadata,
        )
        .await
    }

    pub async fn create_subscription_transaction(
        &self,
        input: SubscriptionTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Subscription {
            subscription_id: input.subscription_id,
            account_id: input.account_id,
            plan_id: input.plan_id,
            plan_code: input.plan_code,
            tier: input.tier,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            input.payment_method,
            input.metadata,
        )
        .await
    }

    pub async fn create_payout_transaction(
        &self,
        input: PayoutTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Payout {
            provider_id: input.provider_id,
            payout_method: input.payout_method,
            account_reference: input.account_reference,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            None,
            input.metadata,
        )
        .await
    }

    pub async fn create_advertisement_transaction(
        &self,
        input: AdvertisementTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Advertisement {
            provider_id: input.provider_id,
            ad_id: input.ad_id,
            campaign_name: input.campaign_name,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            input.payment_method,
            input.metadata,
        )
        .await
    }

    pub async fn create_commission_transaction(
        &self,
        input: CommissionTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Commission {
            partner_id: input.partner_id,
            booking_id: input.booking_id,
            commission_rate: input.commission_rate,
            job_value_cents: input.job_value_cents,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            input.payment_method,
            input.metadata,
        )
        .await
    }

    pub async fn create_refund_transaction(
        &self,
        input: RefundTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Refund {
            original_transaction_id: input.original_transaction_id,
            client_id: input.client_id,
            refund_reason: input.refund_reason,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            input.payment_method,
            input.metadata,
        )
        .await
    }

    /// Loyalty movements settle immediately; they are created `completed`
    /// and carry the points value in the amount column under the `PTS`
    /// currency.
    pub async fn create_loyalty_transaction(
        &self,
        input: LoyaltyTransactionInput,
        action: TransactionAction,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Loyalty {
            account_id: input.account_id,
            points: input.points,
            reason: input.reason,
        };
        self.insert(
            details,
            action,
            TransactionStatus::Completed,
            input.points,
            Some("PTS".to_string()),
            None,
            input.metadata,
        )
        .await
    }

    pub async fn create_penalty_transaction(
        &self,
        input: PenaltyTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Penalty {
            account_id: input.account_id,
            reason: input.reason,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            None,
            input.metadata,
        )
        .await
    }

    pub async fn create_bonus_transaction(
        &self,
        input: BonusTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::Bonus {
            account_id: input.account_id,
            reason: input.reason,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            None,
            input.metadata,
        )
        .await
    }

    pub async fn create_system_transaction(
        &self,
        input: SystemTransactionInput,
        action: TransactionAction,
        status: TransactionStatus,
    ) -> AppResult<LedgerTransaction> {
        let details = TransactionDetails::System {
            reason: input.reason,
            reference: input.reference,
        };
        self.insert(
            details,
            action,
            status,
            input.amount_cents,
            input.currency,
            None,
            input.metadata,
        )
        .await
    }

    /// Shared insert path. The (entity, action) pairing is checked here,
    /// before anything reaches the store.
    async fn insert(
        &self,
        details: TransactionDetails,
        action: TransactionAction,
        status: TransactionStatus,
        amount_cents: i64,
        currency: Option<String>,
        payment_method: Option<PaymentMethod>,
        metadata: Option<Value>,
    ) -> AppResult<LedgerTransaction> {
        let entity = details.entity();
        if !action.permitted_for(entity) {
            return Err(AppError::BadRequest(format!(
                "action `{}` is not permitted for `{}` transactions",
                action.as_str(),
                entity.as_str()
            )));
        }

        let roles = details.role_ids();
        let currency = currency.unwrap_or_else(|| config::DEFAULT_CURRENCY.clone());
        let details_json =
            serde_json::to_value(&details).map_err(|err| AppError::Message(err.to_string()))?;

        let row = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO ledger_transactions (
                id,
                entity,
                action,
                status,
                amount_cents,
                currency,
                payment_method,
                client_id,
                provider_id,
                account_id,
                details,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entity.as_str())
        .bind(action.as_str())
        .bind(status.as_str())
        .bind(amount_cents)
        .bind(&currency)
        .bind(payment_method.map(|method| method.as_str()))
        .bind(roles.client_id)
        .bind(roles.provider_id)
        .bind(roles.account_id)
        .bind(&details_json)
        .bind(metadata.unwrap_or_else(|| json!({})))
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Persists a record lifted out of the legacy collection, keeping its
    /// original timestamp when one survived.
    pub async fn import_migrated(
        &self,
        migrated: MigratedTransaction,
    ) -> AppResult<LedgerTransaction> {
        let entity = migrated.details.entity();
        if !migrated.action.permitted_for(entity) {
            return Err(AppError::BadRequest(format!(
                "action `{}` is not permitted for `{}` transactions",
                migrated.action.as_str(),
                entity.as_str()
            )));
        }

        let roles = migrated.details.role_ids();
        let details_json = serde_json::to_value(&migrated.details)
            .map_err(|err| AppError::Message(err.to_string()))?;

        let row = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO ledger_transactions (
                id,
                entity,
                action,
                status,
                amount_cents,
                currency,
                payment_method,
                client_id,
                provider_id,
                account_id,
                details,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, COALESCE($13, NOW()))
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entity.as_str())
        .bind(migrated.action.as_str())
        .bind(migrated.status.as_str())
        .bind(migrated.amount_cents)
        .bind(&migrated.currency)
        .bind(migrated.payment_method.map(|method| method.as_str()))
        .bind(roles.client_id)
        .bind(roles.provider_id)
        .bind(roles.account_id)
        .bind(&details_json)
        .bind(&migrated.metadata)
        .bind(migrated.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_transaction(&self, id: Uuid) -> AppResult<LedgerTransaction> {
        let row = sqlx::query_as::<_, LedgerTransaction>(
            "SELECT * FROM ledger_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(AppError::NotFound)
    }

    /// Filtered page ordered by `(created_at, id)` descending. The cursor is
    /// the keyset of the last returned row.
    pub async fn get_transactions(
        &self,
        filter: &TransactionFilter,
        page_size: Option<i64>,
        cursor: Option<&str>,
    ) -> AppResult<TransactionPage> {
        let page_size = page_size
            .filter(|size| *size > 0)
            .unwrap_or(*config::LEDGER_DEFAULT_PAGE_SIZE)
            .min(500);

        let keyset = match cursor {
            Some(raw) => Some(
                decode_cursor(raw)
                    .ok_or_else(|| AppError::BadRequest("invalid cursor".to_string()))?,
            ),
            None => None,
        };

        let mut builder = QueryBuilder::new("SELECT * FROM ledger_transactions WHERE TRUE");
        apply_filters(&mut builder, filter);

        if let Some((created_at, id)) = keyset {
            builder.push(" AND (created_at, id) < (");
            builder.push_bind(created_at);
            builder.push(", ");
            builder.push_bind(id);
            builder.push(")");
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(page_size + 1);

        let mut rows = builder
            .build_query_as::<LedgerTransaction>()
            .fetch_all(&self.pool)
            .await?;

        let next_cursor = if rows.len() as i64 > page_size {
            rows.truncate(page_size as usize);
            rows.last()
                .map(|row| encode_cursor(row.created_at, row.id))
        } else {
            None
        };

        Ok(TransactionPage {
            transactions: rows,
            next_cursor,
        })
    }

    /// Count and amount sums grouped by entity, status, payment method and
    /// action. Aggregates over a bounded fetch of at most
    /// `LEDGER_STATS_SCAN_LIMIT` filtered rows, not a server-side aggregate.
    pub async fn transaction_stats(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<TransactionStats> {
        let mut builder = QueryBuilder::new("SELECT * FROM ledger_transactions WHERE TRUE");
        apply_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(*config::LEDGER_STATS_SCAN_LIMIT);

        let rows = builder
            .build_query_as::<LedgerTransaction>()
            .fetch_all(&self.pool)
            .await?;

        let mut stats = TransactionStats::default();
        for row in &rows {
            stats.total_transactions += 1;
            stats.total_amount_cents += row.amount_cents;
            bump(&mut stats.by_entity, &row.entity, row.amount_cents);
            bump(&mut stats.by_status, &row.status, row.amount_cents);
            bump(&mut stats.by_action, &row.action, row.amount_cents);
            if let Some(method) = row.payment_method.as_deref() {
                bump(&mut stats.by_payment_method, method, row.amount_cents);
            }
        }
        Ok(stats)
    }

    /// Marks a transaction verified and appends the admin columns, then
    /// notifies the external dispatcher. Dispatcher failure never rolls back
    /// the committed update.
    pub async fn verify_transaction(
        &self,
        id: Uuid,
        admin_id: Uuid,
        note: Option<String>,
    ) -> AppResult<LedgerTransaction> {
        let updated = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET status = 'verified',
                verified_by = $1,
                verified_at = NOW(),
                updated_at = NOW(),
                metadata = CASE
                    WHEN $2::text IS NULL THEN metadata
                    ELSE metadata || jsonb_build_object('verification_note', $2::text)
                END
            WHERE id = $3
              AND status IN ('pending', 'processing', 'completed')
            "#,
        )
        .bind(admin_id)
        .bind(note)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let current = self.get_transaction(id).await?;
            return Err(AppError::BadRequest(format!(
                "transaction {id} cannot be verified from status `{}`",
                current.status
            )));
        }

        let row = self.get_transaction(id).await?;
        self.notify("transaction_verified", &row).await;
        Ok(row)
    }

    pub async fn reject_transaction(
        &self,
        id: Uuid,
        admin_id: Uuid,
        reason: String,
    ) -> AppResult<LedgerTransaction> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "a rejection reason is required".to_string(),
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET status = 'rejected',
                verified_by = $1,
                rejected_at = NOW(),
                rejection_reason = $2,
                updated_at = NOW()
            WHERE id = $3
              AND status IN ('pending', 'processing')
            "#,
        )
        .bind(admin_id)
        .bind(&reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let current = self.get_transaction(id).await?;
            return Err(AppError::BadRequest(format!(
                "transaction {id} cannot be rejected from status `{}`",
                current.status
            )));
        }

        let row = self.get_transaction(id).await?;
        self.notify("transaction_rejected", &row).await;
        Ok(row)
    }

    /// Verifies each id independently and concurrently. Partial failure is
    /// expected; no transaction spans the batch.
    pub async fn verify_batch(&self, ids: Vec<Uuid>, admin_id: Uuid) -> BatchOutcome {
        let attempts = join_all(ids.into_iter().map(|id| {
            let service = self.clone();
            async move { (id, service.verify_transaction(id, admin_id, None).await) }
        }))
        .await;

        let mut outcome = BatchOutcome::default();
        for (id, result) in attempts {
            match result {
                Ok(_) => outcome.succeeded.push(id),
                Err(err) => outcome.failed.push(BatchFailure {
                    id,
                    error: err.to_string(),
                }),
            }
        }
        outcome
    }

    async fn notify(&self, event: &str, row: &LedgerTransaction) {
        let recipient = row.account_id.or(row.client_id).or(row.provider_id);
        let notification = LedgerNotification {
            event: event.to_string(),
            recipient,
            entity: row.entity.clone(),
            transaction_id: row.id,
            amount_cents: row.amount_cents,
            currency: row.currency.clone(),
        };
        if let Err(err) = self.dispatcher.dispatch(notification).await {
            warn!(?err, transaction = %row.id, "notification dispatch failed");
        }
    }
}

fn bump(buckets: &mut std::collections::HashMap<String, StatBucket>, key: &str, amount: i64) {
    let bucket = buckets.entry(key.to_string()).or_default();
    bucket.count += 1;
    bucket.amount_cents += amount;
}

fn apply_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    if let Some(entity) = filter.entity {
        builder.push(" AND entity = ");
        builder.push_bind(entity.as_str());
    }
    if let Some(action) = filter.action {
        builder.push(" AND action = ");
        builder.push_bind(action.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(client_id) = filter.client_id {
        builder.push(" AND client_id = ");
        builder.push_bind(client_id);
    }
    if let Some(provider_id) = filter.provider_id {
        builder.push(" AND provider_id = ");
        builder.push_bind(provider_id);
    }
    if let Some(account_id) = filter.account_id {
        builder.push(" AND (client_id = ");
        builder.push_bind(account_id);
        builder.push(" OR provider_id = ");
        builder.push_bind(account_id);
        builder.push(" OR account_id = ");
        builder.push_bind(account_id);
        builder.push(")");
    }
    if let Some(method) = filter.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method.as_str());
    }
    if let Some(min) = filter.min_amount_cents {
        builder.push(" AND amount_cents >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.max_amount_cents {
        builder.push(" AND amount_cents <= ");
        builder.push_bind(max);
    }
    if let Some(start) = filter.start {
        builder.push(" AND created_at >= ");
        builder.push_bind(start);
    }
    if let Some(end) = filter.end {
        builder.push(" AND created_at <= ");
        builder.push_bind(end);
    }
}

fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    BASE64.encode(format!("{}|{}", created_at.to_rfc3339(), id))
}

fn decode_cursor(raw: &str) -> Option<(DateTime<Utc>, Uuid)> {
    let bytes = BASE64.decode(raw).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (timestamp, id) = text.split_once('|')?;
    let created_at = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).ok()?;
    Some((created_at, id))
}

#[cfg(test)]
mod tests {
    use super::{decode_cursor, encode_cursor};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn cursor_round_trips() {
        let created_at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 30, 45).unwrap();
        let id = Uuid::new_v4();
        let cursor = encode_cursor(created_at, id);
        assert_eq!(decode_cursor(&cursor), Some((created_at, id)));
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert_eq!(decode_cursor("not-base64!"), None);
        // valid base64, wrong payload shape
        use base64::Engine as _;
        let bogus = base64::engine::general_purpose::STANDARD.encode("hello world");
        assert_eq!(decode_cursor(&bogus), None);
    }
}
