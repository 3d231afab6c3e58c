//! Transaction domain model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CardId, PaymentRef, TransactionId, UserId};
use super::money::Money;

/// Lifecycle state of a transaction.
///
/// `Pending` is the only non-terminal state. The single transition allowed
/// out of a terminal state is `Success -> Reversed`, and it is owned
/// exclusively by the reversal flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Success,
    Fail,
    Reversed,
}

impl TransactionStatus {
    /// True for states that accept no further gateway results.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl AsRef<str> for TransactionStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Reversed => "reversed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "fail" => Ok(Self::Fail),
            "reversed" => Ok(Self::Reversed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Risk classification derived from the provider's numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskIndex {
    Low,
    Medium,
    High,
    /// Missing or unparseable score. Never fabricated into a default bucket.
    #[default]
    Unknown,
}

impl RiskIndex {
    /// Maps the provider score: 0-3 low, 4-6 medium, 7+ high.
    pub fn from_score(score: Option<i64>) -> Self {
        match score {
            Some(n) if n <= 3 => Self::Low,
            Some(n) if n <= 6 => Self::Medium,
            Some(_) => Self::High,
            None => Self::Unknown,
        }
    }
}

impl AsRef<str> for RiskIndex {
    fn as_ref(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RiskIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for RiskIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown risk index: {other}")),
        }
    }
}

/// One capture or single-buy attempt against the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier, doubles as the gateway `shop_process_id`.
    pub id: TransactionId,
    /// Owning user. Cleared if the user is later removed.
    pub user_id: Option<UserId>,
    /// External payment reference this transaction is attached to.
    pub payment_ref: Option<PaymentRef>,
    /// Card used for the capture. Absent for single-buy flows.
    pub card_id: Option<CardId>,
    pub amount: Money,
    pub status: TransactionStatus,
    /// IP address of the paying customer, when known.
    pub customer_ip: Option<String>,
    /// Merchant-supplied capture description.
    pub description: String,
    /// Description echoed back by the provider.
    pub response_description: String,
    pub authorization_code: String,
    pub risk_index: RiskIndex,
    /// Per-transaction secret issued by the provider on first response,
    /// used to authenticate later callbacks. Write-once.
    pub verification_token: Option<String>,
    /// Raw provider payload, kept for audit.
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for opening a transaction. The ledger is the only place that
/// turns this into a stored `Transaction`.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Option<UserId>,
    pub payment_ref: Option<PaymentRef>,
    pub card_id: Option<CardId>,
    pub amount: Money,
    pub description: String,
    pub customer_ip: Option<String>,
}

/// Terminal update transcribed from a gateway result.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub response_description: String,
    pub authorization_code: String,
    pub risk_index: RiskIndex,
    pub verification_token: Option<String>,
    pub raw_response: serde_json::Value,
}

impl TransactionUpdate {
    /// Terminal failure recorded when the provider definitively rejected the
    /// operation without a transaction outcome body.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            status: TransactionStatus::Fail,
            response_description: description.into(),
            authorization_code: String::new(),
            risk_index: RiskIndex::Unknown,
            verification_token: None,
            raw_response: serde_json::Value::Null,
        }
    }
}
