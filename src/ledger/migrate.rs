use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::models::{PaymentMethod, TransactionAction, TransactionDetails, TransactionStatus};

/// Flat record shape used by the pre-ledger transaction collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyTransaction {
    pub transaction_type: String,
    pub status: Option<String>,
    /// Decimal peso amount (points for loyalty rows).
    pub amount: f64,
    pub payment_method: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub plan_code: Option<String>,
    pub tier: Option<String>,
    pub ad_id: Option<Uuid>,
    pub original_transaction_id: Option<Uuid>,
    pub commission_rate: Option<f64>,
    pub job_value: Option<f64>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A legacy record lifted into the tagged shape, ready for insertion.
#[derive(Debug, Clone)]
pub struct MigratedTransaction {
    pub details: TransactionDetails,
    pub action: TransactionAction,
    pub status: TransactionStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub metadata: Value,
    pub created_at: Option<DateTime<Utc>>,
}

/// key: ledger-migration -> explicit per-legacy-type mapping
///
/// Pure adapter; an unrecognized legacy type or status is a hard failure so
/// a backfill can never drop records silently.
pub fn migrate_legacy_transaction(legacy: &LegacyTransaction) -> Result<MigratedTransaction> {
    let (details, action) = match legacy.transaction_type.as_str() {
        "booking_payment" => (
            TransactionDetails::Booking {
                booking_id: require(legacy.booking_id, "booking_id", legacy)?,
                client_id: require(legacy.client_id, "client_id", legacy)?,
                provider_id: require(legacy.provider_id, "provider_id", legacy)?,
            },
            TransactionAction::Payment,
        ),
        "subscription" | "subscription_payment" => (
            TransactionDetails::Subscription {
                subscription_id: require(legacy.subscription_id, "subscription_id", legacy)?,
                account_id: require(legacy.user_id, "user_id", legacy)?,
                plan_id: require(legacy.plan_id, "plan_id", legacy)?,
                plan_code: require(legacy.plan_code.clone(), "plan_code", legacy)?,
                tier: legacy.tier.clone().unwrap_or_else(|| "pro".to_string()),
            },
            TransactionAction::Payment,
        ),
        "payout" | "payout_completion" => (
            payout_details(legacy)?,
            TransactionAction::PayoutCompletion,
        ),
        "payout_request" => (payout_details(legacy)?, TransactionAction::PayoutRequest),
        "ad_payment" | "advertisement" => (
            TransactionDetails::Advertisement {
                provider_id: require(legacy.provider_id, "provider_id", legacy)?,
                ad_id: require(legacy.ad_id, "ad_id", legacy)?,
                campaign_name: legacy.description.clone(),
            },
            TransactionAction::Payment,
        ),
        "commission" => (
            TransactionDetails::Commission {
                partner_id: require(legacy.provider_id, "provider_id", legacy)?,
                booking_id: legacy.booking_id,
                commission_rate: require(legacy.commission_rate, "commission_rate", legacy)?,
                job_value_cents: to_cents(require(legacy.job_value, "job_value", legacy)?),
            },
            TransactionAction::CommissionCharge,
        ),
        "refund" | "booking_refund" => (
            TransactionDetails::Refund {
                original_transaction_id: require(
                    legacy.original_transaction_id,
                    "original_transaction_id",
                    legacy,
                )?,
                client_id: legacy.client_id,
                refund_reason: require(legacy.description.clone(), "description", legacy)?,
            },
            TransactionAction::RefundCompletion,
        ),
        "loyalty" | "loyalty_points" => (
            TransactionDetails::Loyalty {
                account_id: require(legacy.user_id, "user_id", legacy)?,
                points: legacy.amount.round() as i64,
                reason: legacy
                    .description
                    .clone()
                    .unwrap_or_else(|| "migrated loyalty movement".to_string()),
            },
            TransactionAction::PointsEarned,
        ),
        "penalty" => (
            TransactionDetails::Penalty {
                account_id: require(legacy.user_id, "user_id", legacy)?,
                reason: require(legacy.description.clone(), "description", legacy)?,
            },
            TransactionAction::PenaltyCharge,
        ),
        "bonus" => (
            TransactionDetails::Bonus {
                account_id: require(legacy.user_id, "user_id", legacy)?,
                reason: require(legacy.description.clone(), "description", legacy)?,
            },
            TransactionAction::BonusGrant,
        ),
        "adjustment" | "system_adjustment" => (
            TransactionDetails::System {
                reason: require(legacy.description.clone(), "description", legacy)?,
                reference: legacy.reference.clone(),
            },
            TransactionAction::Adjustment,
        ),
        other => bail!("unmapped legacy transaction type `{other}`"),
    };

    let status = map_status(legacy.status.as_deref())?;

    let is_loyalty = matches!(details, TransactionDetails::Loyalty { .. });
    let (amount_cents, currency) = if is_loyalty {
        (legacy.amount.round() as i64, "PTS".to_string())
    } else {
        (to_cents(legacy.amount), "PHP".to_string())
    };

    let mut metadata = json!({ "migrated_from": legacy.transaction_type });
    let payment_method = match legacy.payment_method.as_deref() {
        Some(raw) => match PaymentMethod::parse(raw) {
            Some(method) => Some(method),
            None => {
                metadata["legacy_payment_method"] = json!(raw);
                None
            }
        },
        None => None,
    };
    if let Some(reference) = legacy.reference.as_deref() {
        metadata["legacy_reference"] = json!(reference);
    }

    Ok(MigratedTransaction {
        details,
        action,
        status,
        amount_cents,
        currency,
        payment_method,
        metadata,
        created_at: legacy.created_at,
    })
}

fn payout_details(legacy: &LegacyTransaction) -> Result<TransactionDetails> {
    Ok(TransactionDetails::Payout {
        provider_id: require(legacy.provider_id, "provider_id", legacy)?,
        payout_method: legacy
            .payment_method
            .clone()
            .unwrap_or_else(|| "bank_transfer".to_string()),
        account_reference: require(legacy.reference.clone(), "reference", legacy)?,
    })
}

fn require<T>(value: Option<T>, field: &str, legacy: &LegacyTransaction) -> Result<T> {
    value.ok_or_else(|| {
        anyhow!(
            "legacy `{}` record is missing required field `{field}`",
            legacy.transaction_type
        )
    })
}

fn map_status(raw: Option<&str>) -> Result<TransactionStatus> {
    let raw = raw.unwrap_or("completed");
    match raw {
        "success" | "paid" => Ok(TransactionStatus::Completed),
        other => TransactionStatus::parse(other)
            .ok_or_else(|| anyhow!("unmapped legacy transaction status `{other}`")),
    }
}

fn to_cents(pesos: f64) -> i64 {
    (pesos * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::TransactionEntity;

    fn legacy_booking() -> LegacyTransaction {
        LegacyTransaction {
            transaction_type: "booking_payment".to_string(),
            status: Some("paid".to_string()),
            amount: 1500.0,
            payment_method: Some("gcash".to_string()),
            client_id: Some(Uuid::new_v4()),
            provider_id: Some(Uuid::new_v4()),
            booking_id: Some(Uuid::new_v4()),
            ..LegacyTransaction::default()
        }
    }

    #[test]
    fn booking_payment_maps_to_tagged_booking() {
        let migrated = migrate_legacy_transaction(&legacy_booking()).unwrap();
        assert_eq!(migrated.details.entity(), TransactionEntity::Booking);
        assert_eq!(migrated.action, TransactionAction::Payment);
        assert_eq!(migrated.status, TransactionStatus::Completed);
        assert_eq!(migrated.amount_cents, 150_000);
        assert_eq!(migrated.payment_method, Some(PaymentMethod::Gcash));
    }

    #[test]
    fn unknown_legacy_type_is_a_hard_failure() {
        let legacy = LegacyTransaction {
            transaction_type: "gift_card".to_string(),
            ..LegacyTransaction::default()
        };
        let err = migrate_legacy_transaction(&legacy).unwrap_err();
        assert!(err.to_string().contains("unmapped legacy transaction type"));
    }

    #[test]
    fn missing_required_field_fails_instead_of_defaulting() {
        let mut legacy = legacy_booking();
        legacy.booking_id = None;
        let err = migrate_legacy_transaction(&legacy).unwrap_err();
        assert!(err.to_string().contains("booking_id"));
    }

    #[test]
    fn loyalty_amounts_are_points_not_centavos() {
        let legacy = LegacyTransaction {
            transaction_type: "loyalty_points".to_string(),
            amount: 250.0,
            user_id: Some(Uuid::new_v4()),
            ..LegacyTransaction::default()
        };
        let migrated = migrate_legacy_transaction(&legacy).unwrap();
        assert_eq!(migrated.amount_cents, 250);
        assert_eq!(migrated.currency, "PTS");
        assert_eq!(migrated.status, TransactionStatus::Completed);
    }

    #[test]
    fn unknown_payment_method_lands_in_metadata() {
        let mut legacy = legacy_booking();
        legacy.payment_method = Some("palawan_express".to_string());
        let migrated = migrate_legacy_transaction(&legacy).unwrap();
        assert_eq!(migrated.payment_method, None);
        assert_eq!(
            migrated.metadata["legacy_payment_method"],
            serde_json::json!("palawan_express")
        );
    }

    #[test]
    fn unknown_legacy_status_is_rejected() {
        let mut legacy = legacy_booking();
        legacy.status = Some("kinda_done".to_string());
        assert!(migrate_legacy_transaction(&legacy).is_err());
    }
}
