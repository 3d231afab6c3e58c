//! Payment gateway port.
//!
//! One method per provider operation. Implementations translate these calls
//! into the provider's wire protocol; the in-crate types here are already
//! normalized so the application layer never touches raw payload shapes
//! except for audit storage.

use crate::domain::{CardId, Money, RiskIndex, TransactionId, UserId};

/// Error type for gateway operations.
///
/// The split between `Unavailable` and `Rejected` matters: the first is a
/// transport-level failure (connection error, timeout, unintelligible
/// response) and is retry-eligible; the second is a definitive decline
/// carried in a well-formed provider response, whatever the HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway rejected the operation: {0}")]
    Rejected(String),

    /// A callback payload failed both the recomputed-digest check and the
    /// stored-verification-token check.
    #[error("Callback signature mismatch")]
    SignatureMismatch,
}

/// Provider-issued process handle driving a hosted redirect.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card entry as reported by the provider's listing operation.
#[derive(Debug, Clone)]
pub struct GatewayCard {
    /// The merchant card id echoed back by the provider.
    pub card_id: CardId,
    pub last4: String,
    pub exp_year: u16,
    pub exp_month: u8,
    pub brand: String,
    pub card_type: String,
    pub alias_token: String,
}

impl From<GatewayCard> for crate::domain::CardDetails {
    fn from(card: GatewayCard) -> Self {
        Self {
            last4: card.last4,
            exp_year: card.exp_year,
            exp_month: card.exp_month,
            brand: card.brand,
            card_type: card.card_type,
            alias_token: card.alias_token,
        }
    }
}

/// Parameters for initiating a hosted card registration.
#[derive(Debug, Clone)]
pub struct CardEnrollment {
    pub user_id: UserId,
    pub card_id: CardId,
    pub cellphone: String,
    pub email: String,
    pub return_url: String,
}

/// Parameters for charging a registered card alias.
#[derive(Debug, Clone)]
pub struct ChargeOrder {
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub description: String,
    pub alias_token: String,
    /// Installment count; 1 for a plain capture.
    pub installments: u32,
}

/// Parameters for initiating a provider-hosted single-buy.
#[derive(Debug, Clone)]
pub struct SingleBuyOrder {
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub description: String,
    pub return_url: String,
    pub cancel_url: Option<String>,
    /// Capture through the Zimple wallet instead of a card.
    pub zimple: bool,
    /// Extra provider data; carries the wallet phone number for Zimple.
    pub additional_data: String,
}

/// Normalized transaction outcome extracted from a provider response.
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    pub transaction_id: Option<TransactionId>,
    /// True iff the provider reported `response_code == "00"`.
    pub success: bool,
    pub description: String,
    pub amount: Option<Money>,
    pub authorization_code: String,
    pub customer_ip: Option<String>,
    pub risk_index: RiskIndex,
    /// Per-transaction callback secret issued by the provider.
    pub verification_token: Option<String>,
    /// The full payload as received, kept for audit.
    pub raw: serde_json::Value,
}

/// Outcome of a rollback attempt. A well-formed provider refusal is carried
/// as `success == false`, not as an error, so the reversion record can keep
/// the provider's own wording.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub success: bool,
    pub description: String,
    pub raw: serde_json::Value,
}

/// Port trait for the card-payment provider.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Requests a process handle for a hosted card registration bound to the
    /// given merchant card id.
    async fn init_card_registration(
        &self,
        enrollment: &CardEnrollment,
    ) -> Result<ProcessId, GatewayError>;

    /// Lists every card the provider holds for the user.
    async fn user_cards(&self, user: UserId) -> Result<Vec<GatewayCard>, GatewayError>;

    /// Looks up a single card by merchant card id in the provider listing.
    async fn user_card(
        &self,
        user: UserId,
        card: CardId,
    ) -> Result<Option<GatewayCard>, GatewayError>;

    /// Deletes a card alias on the provider side.
    async fn delete_card(&self, user: UserId, alias_token: &str) -> Result<(), GatewayError>;

    /// Captures a payment against a registered alias.
    async fn charge(&self, order: &ChargeOrder) -> Result<GatewayOutcome, GatewayError>;

    /// Requests a process handle for a provider-hosted single-buy.
    async fn init_single_buy(&self, order: &SingleBuyOrder) -> Result<ProcessId, GatewayError>;

    /// Polls the confirmation endpoint for a transaction outcome.
    async fn poll_confirmation(&self, tx: TransactionId) -> Result<GatewayOutcome, GatewayError>;

    /// Attempts to roll back a same-day capture.
    async fn rollback(&self, tx: TransactionId) -> Result<RollbackOutcome, GatewayError>;

    /// Verifies an inbound callback payload and normalizes it.
    ///
    /// Accepts the payload if its digest matches the freshly recomputed value
    /// OR the transaction's stored verification token; rejects with
    /// `SignatureMismatch` otherwise. No IO is performed.
    fn verify_callback(
        &self,
        payload: &serde_json::Value,
        stored_token: Option<&str>,
    ) -> Result<GatewayOutcome, GatewayError>;
}
