use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// key: ledger-taxonomy -> entities,actions,statuses

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionEntity {
    Booking,
    Subscription,
    Payout,
    Advertisement,
    Commission,
    Refund,
    Loyalty,
    Penalty,
    Bonus,
    System,
}

impl TransactionEntity {
    pub const ALL: [TransactionEntity; 10] = [
        TransactionEntity::Booking,
        TransactionEntity::Subscription,
        TransactionEntity::Payout,
        TransactionEntity::Advertisement,
        TransactionEntity::Commission,
        TransactionEntity::Refund,
        TransactionEntity::Loyalty,
        TransactionEntity::Penalty,
        TransactionEntity::Bonus,
        TransactionEntity::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionEntity::Booking => "booking",
            TransactionEntity::Subscription => "subscription",
            TransactionEntity::Payout => "payout",
            TransactionEntity::Advertisement => "advertisement",
            TransactionEntity::Commission => "commission",
            TransactionEntity::Refund => "refund",
            TransactionEntity::Loyalty => "loyalty",
            TransactionEntity::Penalty => "penalty",
            TransactionEntity::Bonus => "bonus",
            TransactionEntity::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|entity| entity.as_str() == value)
    }

    /// The fixed action set permitted for this entity. Checked at
    /// construction time, never by inspecting persisted rows.
    pub fn permitted_actions(&self) -> &'static [TransactionAction] {
        use TransactionAction::*;
        match self {
            TransactionEntity::Booking => &[Payment, PaymentVerification, PaymentRejection, Refund],
            TransactionEntity::Subscription => &[
                Payment,
                PaymentVerification,
                PaymentRejection,
                Renewal,
                TrialConversion,
            ],
            TransactionEntity::Payout => &[PayoutRequest, PayoutCompletion, PayoutRejection],
            TransactionEntity::Advertisement => {
                &[Payment, PaymentVerification, PaymentRejection]
            }
            TransactionEntity::Commission => {
                &[CommissionCharge, CommissionPayment, CommissionWaiver]
            }
            TransactionEntity::Refund => &[RefundRequest, RefundCompletion, RefundRejection],
            TransactionEntity::Loyalty => &[PointsEarned, PointsRedeemed, PointsExpired],
            TransactionEntity::Penalty => &[PenaltyCharge, PenaltyWaiver],
            TransactionEntity::Bonus => &[BonusGrant],
            TransactionEntity::System => &[Adjustment, Correction],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAction {
    Payment,
    PaymentVerification,
    PaymentRejection,
    Refund,
    Renewal,
    TrialConversion,
    PayoutRequest,
    PayoutCompletion,
    PayoutRejection,
    CommissionCharge,
    CommissionPayment,
    CommissionWaiver,
    RefundRequest,
    RefundCompletion,
    RefundRejection,
    PointsEarned,
    PointsRedeemed,
    PointsExpired,
    PenaltyCharge,
    PenaltyWaiver,
    BonusGrant,
    Adjustment,
    Correction,
}

impl TransactionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionAction::Payment => "payment",
            TransactionAction::PaymentVerification => "payment_verification",
            TransactionAction::PaymentRejection => "payment_rejection",
            TransactionAction::Refund => "refund",
            TransactionAction::Renewal => "renewal",
            TransactionAction::TrialConversion => "trial_conversion",
            TransactionAction::PayoutRequest => "payout_request",
            TransactionAction::PayoutCompletion => "payout_completion",
            TransactionAction::PayoutRejection => "payout_rejection",
            TransactionAction::CommissionCharge => "commission_charge",
            TransactionAction::CommissionPayment => "commission_payment",
            TransactionAction::CommissionWaiver => "commission_waiver",
            TransactionAction::RefundRequest => "refund_request",
            TransactionAction::RefundCompletion => "refund_completion",
            TransactionAction::RefundRejection => "refund_rejection",
            TransactionAction::PointsEarned => "points_earned",
            TransactionAction::PointsRedeemed => "points_redeemed",
            TransactionAction::PointsExpired => "points_expired",
            TransactionAction::PenaltyCharge => "penalty_charge",
            TransactionAction::PenaltyWaiver => "penalty_waiver",
            TransactionAction::BonusGrant => "bonus_grant",
            TransactionAction::Adjustment => "adjustment",
            TransactionAction::Correction => "correction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        use TransactionAction::*;
        let all = [
            Payment,
            PaymentVerification,
            PaymentRejection,
            Refund,
            Renewal,
            TrialConversion,
            PayoutRequest,
            PayoutCompletion,
            PayoutRejection,
            CommissionCharge,
            CommissionPayment,
            CommissionWaiver,
            RefundRequest,
            RefundCompletion,
            RefundRejection,
            PointsEarned,
            PointsRedeemed,
            PointsExpired,
            PenaltyCharge,
            PenaltyWaiver,
            BonusGrant,
            Adjustment,
            Correction,
        ];
        all.iter().copied().find(|action| action.as_str() == value)
    }

    pub fn permitted_for(&self, entity: TransactionEntity) -> bool {
        entity.permitted_actions().contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
    Cancelled,
    Refunded,
    Verified,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Verified => "verified",
            TransactionStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        use TransactionStatus::*;
        let all = [
            Pending, Processing, Completed, Failed, Rejected, Cancelled, Refunded, Verified,
            Expired,
        ];
        all.iter().copied().find(|status| status.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gcash,
    Maya,
    Card,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Gcash => "gcash",
            PaymentMethod::Maya => "maya",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        use PaymentMethod::*;
        let all = [Gcash, Maya, Card, BankTransfer, Cash];
        all.iter().copied().find(|method| method.as_str() == value)
    }
}

/// Entity-specific payload. One variant per ledger entity, carrying exactly
/// the fields that entity requires; dispatch is by pattern matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum TransactionDetails {
    Booking {
        booking_id: Uuid,
        client_id: Uuid,
        provider_id: Uuid,
    },
    Subscription {
        subscription_id: Uuid,
        account_id: Uuid,
        plan_id: Uuid,
        plan_code: String,
        tier: String,
    },
    Payout {
        provider_id: Uuid,
        payout_method: String,
        account_reference: String,
    },
    Advertisement {
        provider_id: Uuid,
        ad_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        campaign_name: Option<String>,
    },
    Commission {
        partner_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booking_id: Option<Uuid>,
        commission_rate: f64,
        job_value_cents: i64,
    },
    Refund {
        original_transaction_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<Uuid>,
        refund_reason: String,
    },
    Loyalty {
        account_id: Uuid,
        points: i64,
        reason: String,
    },
    Penalty {
        account_id: Uuid,
        reason: String,
    },
    Bonus {
        account_id: Uuid,
        reason: String,
    },
    System {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
}

/// Role ids denormalised out of the details for filterable columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleIds {
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
}

impl TransactionDetails {
    pub fn entity(&self) -> TransactionEntity {
        match self {
            TransactionDetails::Booking { .. } => TransactionEntity::Booking,
            TransactionDetails::Subscription { .. } => TransactionEntity::Subscription,
            TransactionDetails::Payout { .. } => TransactionEntity::Payout,
            TransactionDetails::Advertisement { .. } => TransactionEntity::Advertisement,
            TransactionDetails::Commission { .. } => TransactionEntity::Commission,
            TransactionDetails::Refund { .. } => TransactionEntity::Refund,
            TransactionDetails::Loyalty { .. } => TransactionEntity::Loyalty,
            TransactionDetails::Penalty { .. } => TransactionEntity::Penalty,
            TransactionDetails::Bonus { .. } => TransactionEntity::Bonus,
            TransactionDetails::System { .. } => TransactionEntity::System,
        }
    }

    pub fn role_ids(&self) -> RoleIds {
        match self {
            TransactionDetails::Booking {
                client_id,
                provider_id,
                ..
            } => RoleIds {
                client_id: Some(*client_id),
                provider_id: Some(*provider_id),
                account_id: None,
            },
            TransactionDetails::Subscription { account_id, .. }
            | TransactionDetails::Loyalty { account_id, .. }
            | TransactionDetails::Penalty { account_id, .. }
            | TransactionDetails::Bonus { account_id, .. } => RoleIds {
                account_id: Some(*account_id),
                ..RoleIds::default()
            },
            TransactionDetails::Payout { provider_id, .. }
            | TransactionDetails::Advertisement { provider_id, .. } => RoleIds {
                provider_id: Some(*provider_id),
                ..RoleIds::default()
            },
            TransactionDetails::Commission { partner_id, .. } => RoleIds {
                provider_id: Some(*partner_id),
                ..RoleIds::default()
            },
            TransactionDetails::Refund { client_id, .. } => RoleIds {
                client_id: *client_id,
                ..RoleIds::default()
            },
            TransactionDetails::System { .. } => RoleIds::default(),
        }
    }
}

/// key: ledger-row -> immutable at creation except admin verification columns
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub entity: String,
    pub action: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub details: Json<TransactionDetails>,
    pub metadata: Value,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter envelope for ledger queries; every field is optional and the
/// combination is ANDed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub entity: Option<TransactionEntity>,
    pub action: Option<TransactionAction>,
    pub status: Option<TransactionStatus>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    /// Matches any of the role columns.
    pub account_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub min_amount_cents: Option<i64>,
    pub max_amount_cents: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<LedgerTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatBucket {
    pub count: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionStats {
    pub total_transactions: i64,
    pub total_amount_cents: i64,
    pub by_entity: HashMap<String, StatBucket>,
    pub by_status: HashMap<String, StatBucket>,
    pub by_payment_method: HashMap<String, StatBucket>,
    pub by_action: HashMap<String, StatBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: Uuid,
    pub error: String,
}

/// Explicit outcome of a fan-out admin batch; partial failure is reported,
/// never hidden behind an all-or-nothing combinator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entity_has_a_nonempty_action_set() {
        for entity in TransactionEntity::ALL {
            assert!(
                !entity.permitted_actions().is_empty(),
                "{} has no actions",
                entity.as_str()
            );
        }
    }

    #[test]
    fn permitted_actions_are_exclusive_where_expected() {
        assert!(TransactionAction::Payment.permitted_for(TransactionEntity::Booking));
        assert!(TransactionAction::TrialConversion.permitted_for(TransactionEntity::Subscription));
        assert!(!TransactionAction::TrialConversion.permitted_for(TransactionEntity::Booking));
        assert!(!TransactionAction::PayoutCompletion.permitted_for(TransactionEntity::Loyalty));
        assert!(!TransactionAction::PointsEarned.permitted_for(TransactionEntity::System));
    }

    #[test]
    fn entity_and_action_round_trip_through_strings() {
        for entity in TransactionEntity::ALL {
            assert_eq!(TransactionEntity::parse(entity.as_str()), Some(entity));
            for action in entity.permitted_actions() {
                assert_eq!(TransactionAction::parse(action.as_str()), Some(*action));
            }
        }
        assert_eq!(TransactionEntity::parse("gift_card"), None);
        assert_eq!(TransactionAction::parse("payment-verification"), None);
    }

    #[test]
    fn details_serialize_with_entity_tag() {
        let details = TransactionDetails::Booking {
            booking_id: Uuid::nil(),
            client_id: Uuid::nil(),
            provider_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value.get("entity").and_then(|v| v.as_str()), Some("booking"));

        let parsed: TransactionDetails = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, details);
    }

    #[test]
    fn details_entity_matches_variant() {
        let details = TransactionDetails::Loyalty {
            account_id: Uuid::nil(),
            points: 120,
            reason: "booking completed".to_string(),
        };
        assert_eq!(details.entity(), TransactionEntity::Loyalty);
        let roles = details.role_ids();
        assert_eq!(roles.account_id, Some(Uuid::nil()));
        assert_eq!(roles.client_id, None);
    }

    #[test]
    fn missing_required_detail_field_fails_deserialization() {
        let raw = serde_json::json!({
            "entity": "refund",
            "refund_reason": "double charge"
        });
        assert!(serde_json::from_value::<TransactionDetails>(raw).is_err());
    }
}
