//! Projections crossing the API boundary.
//!
//! Charge outcomes are split into a public-safe view and a private part.
//! The private part (authorization code, risk classification) must never
//! reach an end customer; it is for merchant-side risk handling only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Card, CardId, Money, PaymentRef, ReversionStatus, RiskIndex, Transaction, TransactionId,
    TransactionStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Card projections
// ─────────────────────────────────────────────────────────────────────────────

/// Card detail safe to show to the card holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardView {
    pub id: CardId,
    pub last4: String,
    pub exp_year: u16,
    pub exp_month: u8,
    pub brand: String,
    pub card_type: String,
    pub is_default: bool,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            last4: card.last4.clone(),
            exp_year: card.exp_year,
            exp_month: card.exp_month,
            brand: card.brand.clone(),
            card_type: card.card_type.clone(),
            is_default: card.is_default,
        }
    }
}

/// Handle returned when card registration is initiated. The `process_id`
/// drives the provider's hosted registration redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationStart {
    pub card_id: CardId,
    pub process_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Charge projections
// ─────────────────────────────────────────────────────────────────────────────

/// Public-safe projection of a charge outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeView {
    pub transaction_id: TransactionId,
    pub payment_ref: Option<PaymentRef>,
    pub amount: Money,
    pub status: TransactionStatus,
    pub response_description: String,
    pub created_at: DateTime<Utc>,
}

/// Provider data that must never be shown to the customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateChargeData {
    pub authorization_code: String,
    pub risk_index: RiskIndex,
}

/// Full charge outcome handed to the merchant application.
#[derive(Debug, Clone)]
pub struct ChargeResponse {
    pub view: ChargeView,
    pub private: PrivateChargeData,
}

impl From<&Transaction> for ChargeResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            view: ChargeView {
                transaction_id: tx.id,
                payment_ref: tx.payment_ref,
                amount: tx.amount,
                status: tx.status,
                response_description: tx.response_description.clone(),
                created_at: tx.created_at,
            },
            private: PrivateChargeData {
                authorization_code: tx.authorization_code.clone(),
                risk_index: tx.risk_index,
            },
        }
    }
}

/// Handle returned when a single-buy is initiated. The transaction id is also
/// embedded into the redirect URLs handed to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleBuyStart {
    pub transaction_id: TransactionId,
    pub process_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reversal projections
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a reversal attempt. Public-safe by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalResponse {
    pub transaction_id: TransactionId,
    pub status: ReversionStatus,
    pub response_description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback acknowledgment
// ─────────────────────────────────────────────────────────────────────────────

/// The exact two-valued acknowledgment the provider's retry policy expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub status: AckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Fail,
}

impl CallbackAck {
    pub fn success() -> Self {
        Self {
            status: AckStatus::Success,
        }
    }

    pub fn fail() -> Self {
        Self {
            status: AckStatus::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    fn sample_transaction() -> Transaction {
        Transaction {
            id: TransactionId::new(7),
            user_id: Some(UserId::new(42)),
            payment_ref: Some(PaymentRef::new(9)),
            card_id: None,
            amount: Money::from_major(1500).unwrap(),
            status: TransactionStatus::Success,
            customer_ip: None,
            description: "order 9".into(),
            response_description: "Transaccion aprobada".into(),
            authorization_code: "A77".into(),
            risk_index: RiskIndex::Low,
            verification_token: Some("tok".into()),
            raw_response: serde_json::Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_public_view_omits_private_data() {
        let response = ChargeResponse::from(&sample_transaction());
        let json = serde_json::to_value(&response.view).unwrap();
        assert!(json.get("authorization_code").is_none());
        assert!(json.get("risk_index").is_none());
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn test_ack_wire_shape() {
        assert_eq!(
            serde_json::to_value(CallbackAck::success()).unwrap(),
            serde_json::json!({ "status": "success" })
        );
        assert_eq!(
            serde_json::to_value(CallbackAck::fail()).unwrap(),
            serde_json::json!({ "status": "fail" })
        );
    }
}
