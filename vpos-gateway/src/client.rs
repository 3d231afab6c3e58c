//! `reqwest`-based implementation of the `PaymentGateway` port.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use vpos_types::{
    CardEnrollment, CardId, ChargeOrder, GatewayCard, GatewayError, GatewayOutcome, PaymentGateway,
    ProcessId, RollbackOutcome, SingleBuyOrder, TransactionId, UserId,
};

use crate::signer::Signer;
use crate::wire::{
    self, ChargeOp, DeleteCardOp, Envelope, NewCardOp, ShopProcessOp, SingleBuyOp, StatusResponse,
    UserCardsOp,
};

/// Provider staging environment.
pub const TEST_BASE_URL: &str = "https://vpos.infonet.com.py:8888/vpos/api/0.3";
/// Provider production environment.
pub const LIVE_BASE_URL: &str = "https://vpos.infonet.com.py/vpos/api/0.3";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the provider API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub public_key: String,
    pub private_key: String,
    pub base_url: String,
    /// Whole-request deadline. A provider that hangs must surface as
    /// `Unavailable` within this bound, never block a caller indefinitely.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Configuration against the provider's staging environment.
    pub fn test(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self::with_base_url(public_key, private_key, TEST_BASE_URL)
    }

    /// Configuration against the provider's production environment.
    pub fn live(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self::with_base_url(public_key, private_key, LIVE_BASE_URL)
    }

    /// Configuration against an arbitrary base URL (local mocks, proxies).
    pub fn with_base_url(
        public_key: impl Into<String>,
        private_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Provider API client.
pub struct VposClient {
    public_key: String,
    base_url: String,
    signer: Signer,
    http: reqwest::Client,
}

impl VposClient {
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            public_key: config.public_key,
            base_url: config.base_url,
            signer: Signer::new(config.private_key),
            http,
        })
    }

    /// Sends a signed envelope and returns the raw JSON body.
    ///
    /// Non-2xx responses still carry definitive provider verdicts as JSON
    /// (the provider uses 4xx for signed-request refusals), so the body is
    /// returned for normalization whenever it parses; only transport
    /// failures and unintelligible responses become `Unavailable`.
    async fn send<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        operation: T,
    ) -> Result<Value, GatewayError> {
        let envelope = Envelope {
            public_key: self.public_key.clone(),
            operation,
        };
        let resp = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = resp.status();
        debug!(%method, path, %status, "provider response");
        let body: Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(path, %status, error = %e, "unreadable provider response");
                return Err(GatewayError::Unavailable(format!(
                    "provider returned HTTP {status} with an unreadable body"
                )));
            }
        };
        if !status.is_success() && !looks_like_verdict(&body) {
            return Err(GatewayError::Unavailable(format!(
                "provider returned HTTP {status}"
            )));
        }
        Ok(body)
    }

    async fn send_for_status<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        operation: T,
    ) -> Result<StatusResponse, GatewayError> {
        let body = self.send(method, path, operation).await?;
        serde_json::from_value(body)
            .map_err(|e| GatewayError::Unavailable(format!("malformed provider response: {e}")))
    }
}

/// Whether a non-2xx body still carries a provider verdict worth normalizing.
fn looks_like_verdict(body: &Value) -> bool {
    body.get("status").is_some()
        || body.get("messages").is_some()
        || wire::operation_object(body).is_some()
}

#[async_trait::async_trait]
impl PaymentGateway for VposClient {
    async fn init_card_registration(
        &self,
        enrollment: &CardEnrollment,
    ) -> Result<ProcessId, GatewayError> {
        let op = NewCardOp {
            token: self
                .signer
                .card_registration(enrollment.card_id, enrollment.user_id),
            card_id: enrollment.card_id.value(),
            user_id: enrollment.user_id.value(),
            user_cell_phone: enrollment.cellphone.clone(),
            user_mail: enrollment.email.clone(),
            return_url: enrollment.return_url.clone(),
        };
        let resp = self.send_for_status(Method::POST, "/cards/new", op).await?;
        if !resp.is_success() {
            return Err(GatewayError::Rejected(resp.first_message()));
        }
        resp.process_id.map(ProcessId).ok_or_else(|| {
            GatewayError::Unavailable("success response carries no process_id".to_string())
        })
    }

    async fn user_cards(&self, user: UserId) -> Result<Vec<GatewayCard>, GatewayError> {
        let op = UserCardsOp {
            token: self.signer.user_cards(user),
        };
        let resp = self
            .send_for_status(Method::POST, &format!("/users/{user}/cards"), op)
            .await?;
        if !resp.is_success() {
            return Err(GatewayError::Rejected(resp.first_message()));
        }
        Ok(resp
            .cards
            .into_iter()
            .map(wire::WireCard::into_gateway_card)
            .collect())
    }

    async fn user_card(
        &self,
        user: UserId,
        card: CardId,
    ) -> Result<Option<GatewayCard>, GatewayError> {
        let cards = self.user_cards(user).await?;
        Ok(cards.into_iter().find(|c| c.card_id == card))
    }

    async fn delete_card(&self, user: UserId, alias_token: &str) -> Result<(), GatewayError> {
        let op = DeleteCardOp {
            token: self.signer.card_delete(user, alias_token),
            alias_token: alias_token.to_string(),
        };
        let resp = self
            .send_for_status(Method::DELETE, &format!("/users/{user}/cards"), op)
            .await?;
        if !resp.is_success() {
            return Err(GatewayError::Rejected(resp.first_message()));
        }
        Ok(())
    }

    async fn charge(&self, order: &ChargeOrder) -> Result<GatewayOutcome, GatewayError> {
        let amount = order.amount.to_wire();
        let op = ChargeOp {
            token: self
                .signer
                .charge(order.transaction_id, &amount, &order.alias_token),
            shop_process_id: order.transaction_id.value(),
            amount,
            number_of_payments: order.installments,
            currency: wire::CURRENCY,
            additional_data: String::new(),
            description: order.description.clone(),
            alias_token: order.alias_token.clone(),
        };
        let body = self.send(Method::POST, "/charge", op).await?;
        wire::parse_outcome(body)
    }

    async fn init_single_buy(&self, order: &SingleBuyOrder) -> Result<ProcessId, GatewayError> {
        let amount = order.amount.to_wire();
        let return_url = wire::embed_tx_param(&order.return_url, order.transaction_id)?;
        let cancel_url = match &order.cancel_url {
            Some(url) => wire::embed_tx_param(url, order.transaction_id)?,
            None => return_url.clone(),
        };
        let op = SingleBuyOp {
            token: self.signer.single_buy(order.transaction_id, &amount),
            shop_process_id: order.transaction_id.value(),
            currency: wire::CURRENCY,
            amount,
            additional_data: order.additional_data.clone(),
            description: order.description.clone(),
            return_url,
            cancel_url,
            zimple: order.zimple.then_some("S"),
        };
        let resp = self
            .send_for_status(Method::POST, "/single_buy", op)
            .await?;
        if !resp.is_success() {
            return Err(GatewayError::Rejected(resp.first_message()));
        }
        resp.process_id.map(ProcessId).ok_or_else(|| {
            GatewayError::Unavailable("success response carries no process_id".to_string())
        })
    }

    async fn poll_confirmation(&self, tx: TransactionId) -> Result<GatewayOutcome, GatewayError> {
        let op = ShopProcessOp {
            token: self.signer.confirmation(tx),
            shop_process_id: tx.value(),
        };
        let body = self
            .send(Method::POST, "/single_buy/confirmations", op)
            .await?;
        wire::parse_outcome(body)
    }

    async fn rollback(&self, tx: TransactionId) -> Result<RollbackOutcome, GatewayError> {
        let op = ShopProcessOp {
            token: self.signer.rollback(tx),
            shop_process_id: tx.value(),
        };
        let raw = self.send(Method::POST, "/single_buy/rollback", op).await?;
        let resp: StatusResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Unavailable(format!("malformed provider response: {e}")))?;
        let success = resp.is_success();
        let description = if success {
            resp.messages
                .first()
                .and_then(|m| m.dsc.clone())
                .unwrap_or_else(|| "Rollback accepted".to_string())
        } else {
            resp.first_message()
        };
        Ok(RollbackOutcome {
            success,
            description,
            raw,
        })
    }

    fn verify_callback(
        &self,
        payload: &Value,
        stored_token: Option<&str>,
    ) -> Result<GatewayOutcome, GatewayError> {
        // A payload missing any field needed for verification cannot be
        // authenticated, so it fails closed.
        let operation = wire::operation_object(payload).ok_or(GatewayError::SignatureMismatch)?;
        let tx = wire::shop_process_id(operation).ok_or(GatewayError::SignatureMismatch)?;
        let amount = wire::amount_str(operation).ok_or(GatewayError::SignatureMismatch)?;
        let currency = operation
            .get("currency")
            .and_then(Value::as_str)
            .ok_or(GatewayError::SignatureMismatch)?;
        let supplied = operation
            .get("token")
            .and_then(Value::as_str)
            .ok_or(GatewayError::SignatureMismatch)?;

        let digest_ok = self.signer.verify_callback(supplied, tx, &amount, currency);
        let token_ok = stored_token.is_some_and(|stored| stored == supplied);
        if !digest_ok && !token_ok {
            return Err(GatewayError::SignatureMismatch);
        }
        wire::parse_outcome(payload.clone())
    }
}
