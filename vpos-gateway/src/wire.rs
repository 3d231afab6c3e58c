//! Wire shapes and response normalization for the provider protocol.
//!
//! Requests are `{ public_key, operation: { token, ...fields } }` envelopes.
//! Transaction outcomes arrive inside an `operation` (charge, callback) or
//! `confirmation` (poll) sub-object; registration/list/delete operations
//! signal success through a top-level `status` field instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use vpos_types::{
    CardId, GatewayCard, GatewayError, GatewayOutcome, Money, RiskIndex, TransactionId,
};

/// Fixed 3-letter currency literal the provider accepts.
pub const CURRENCY: &str = vpos_types::CURRENCY;

// ─────────────────────────────────────────────────────────────────────────────
// Request envelopes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub public_key: String,
    pub operation: T,
}

#[derive(Debug, Serialize)]
pub struct NewCardOp {
    pub token: String,
    pub card_id: i64,
    pub user_id: i64,
    pub user_cell_phone: String,
    pub user_mail: String,
    pub return_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserCardsOp {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteCardOp {
    pub token: String,
    pub alias_token: String,
}

#[derive(Debug, Serialize)]
pub struct ChargeOp {
    pub token: String,
    pub shop_process_id: i64,
    pub amount: String,
    pub number_of_payments: u32,
    pub currency: &'static str,
    pub additional_data: String,
    pub description: String,
    pub alias_token: String,
}

#[derive(Debug, Serialize)]
pub struct SingleBuyOp {
    pub token: String,
    pub shop_process_id: i64,
    pub currency: &'static str,
    pub amount: String,
    pub additional_data: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zimple: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ShopProcessOp {
    pub token: String,
    pub shop_process_id: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level response for registration/list/delete operations.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: Option<String>,
    pub process_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub cards: Vec<WireCard>,
}

impl StatusResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    /// The provider's own wording for a refusal, when present.
    pub fn first_message(&self) -> String {
        self.messages
            .first()
            .and_then(|m| m.dsc.clone())
            .unwrap_or_else(|| "Operation rejected by provider".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub key: Option<String>,
    pub dsc: Option<String>,
}

/// Card entry in the provider's listing response.
#[derive(Debug, Deserialize)]
pub struct WireCard {
    pub card_id: i64,
    pub card_masked_number: Option<String>,
    pub expiration_date: Option<String>,
    pub card_brand: Option<String>,
    pub card_type: Option<String>,
    pub alias_token: Option<String>,
}

impl WireCard {
    /// Normalizes the listing entry. Expiry arrives as `MM/YYYY`.
    pub fn into_gateway_card(self) -> GatewayCard {
        let (exp_month, exp_year) = self
            .expiration_date
            .as_deref()
            .and_then(|raw| raw.split_once('/'))
            .map(|(month, year)| {
                (
                    month.parse::<u8>().unwrap_or_default(),
                    year.parse::<u16>().unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        let last4 = self
            .card_masked_number
            .as_deref()
            .map(|masked| {
                let digits = masked.chars().rev().take(4).collect::<Vec<_>>();
                digits.into_iter().rev().collect::<String>()
            })
            .unwrap_or_default();
        GatewayCard {
            card_id: CardId::new(self.card_id),
            last4,
            exp_year,
            exp_month,
            brand: self.card_brand.unwrap_or_default(),
            card_type: self.card_type.unwrap_or_default(),
            alias_token: self.alias_token.unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome normalization
// ─────────────────────────────────────────────────────────────────────────────

/// The `operation`/`confirmation` sub-object of a transaction outcome.
pub fn operation_object(raw: &Value) -> Option<&Value> {
    raw.get("operation")
        .or_else(|| raw.get("confirmation"))
        .filter(|v| v.is_object())
}

/// Extracts the amount exactly as it must feed digest computation: the wire
/// string when the provider sent a string, `{:.2}` formatting otherwise.
pub fn amount_str(operation: &Value) -> Option<String> {
    match operation.get("amount") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => n.as_f64().map(|f| format!("{f:.2}")),
        _ => None,
    }
}

/// Extracts the merchant transaction id (`shop_process_id`), numeric or
/// string-encoded.
pub fn shop_process_id(operation: &Value) -> Option<TransactionId> {
    match operation.get("shop_process_id") {
        Some(Value::Number(n)) => n.as_i64().map(TransactionId::new),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn str_field(operation: &Value, key: &str) -> Option<String> {
    operation.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Normalizes a transaction-outcome response body.
///
/// A body carrying an `operation`/`confirmation` object is a definitive
/// outcome, approved or declined. A body with an explicit non-success top
/// level `status` is a definitive rejection. Anything else is an unexpected
/// shape and therefore retry-eligible, never a fabricated decline.
pub fn parse_outcome(raw: Value) -> Result<GatewayOutcome, GatewayError> {
    let Some(operation) = operation_object(&raw) else {
        if let Some(status) = raw.get("status").and_then(Value::as_str) {
            if status != "success" {
                let description = raw
                    .get("messages")
                    .and_then(|m| m.get(0))
                    .and_then(|m| m.get("dsc"))
                    .and_then(Value::as_str)
                    .unwrap_or("Operation rejected by provider");
                return Err(GatewayError::Rejected(description.to_string()));
            }
        }
        return Err(GatewayError::Unavailable(
            "response carries no operation or confirmation object".to_string(),
        ));
    };

    let risk_score = operation
        .get("security_information")
        .and_then(|s| s.get("risk_index"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

    let outcome = GatewayOutcome {
        transaction_id: shop_process_id(operation),
        success: str_field(operation, "response_code").as_deref() == Some("00"),
        description: str_field(operation, "response_description").unwrap_or_default(),
        amount: amount_str(operation).and_then(|s| Money::parse_wire(&s).ok()),
        authorization_code: str_field(operation, "authorization_number").unwrap_or_default(),
        customer_ip: operation
            .get("security_information")
            .and_then(|s| s.get("customer_ip"))
            .and_then(Value::as_str)
            .map(str::to_string),
        risk_index: RiskIndex::from_score(risk_score),
        verification_token: str_field(operation, "token"),
        raw,
    };
    Ok(outcome)
}

// ─────────────────────────────────────────────────────────────────────────────
// Redirect URL correlation
// ─────────────────────────────────────────────────────────────────────────────

/// Embeds the transaction id as a `tx_id` query parameter so the provider's
/// redirect-back can be correlated even if the provider loses context.
/// Replaces an existing `tx_id` parameter instead of duplicating it.
pub fn embed_tx_param(raw_url: &str, tx: TransactionId) -> Result<String, GatewayError> {
    let mut url = Url::parse(raw_url)
        .map_err(|e| GatewayError::Rejected(format!("invalid redirect URL {raw_url}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "tx_id")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("tx_id", &tx.to_string());
    }
    Ok(url.into())
}
