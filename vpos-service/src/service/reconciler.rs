//! Reconciler service.
//!
//! Merges the three sources of truth about a transaction - the synchronous
//! gateway response, a later polled confirmation, and the asynchronous
//! callback - into one consistent ledger record, and owns the reversal
//! policy.
//!
//! Failure handling follows one rule throughout: `GatewayError::Unavailable`
//! is surfaced to the caller and the transaction is left `pending` for a
//! retry; only a definitive provider verdict produces a terminal status.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use vpos_types::{
    AppError, CardId, ChargeOrder, ChargeResponse, ChargeView, DomainError, GatewayError,
    GatewayOutcome, Money, NewTransaction, PaymentGateway, PaymentRef, PaymentStore, RepoError,
    ReversalResponse, ReversionStatus, SingleBuyOrder, SingleBuyStart, Transaction,
    TransactionEvent, TransactionId, TransactionStatus, UserId,
};

use super::ledger::TransactionLedger;

/// Recorded on a reversion refused by the same-day policy.
pub const SAME_DAY_MESSAGE: &str =
    "Only transactions performed on same date can be rolled back.";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Parameters for capturing a payment with a registered card.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub user_id: UserId,
    pub card_id: CardId,
    pub payment_ref: PaymentRef,
    pub amount: Money,
    pub description: String,
    /// Installment count; defaults to a plain single capture.
    pub installments: Option<u32>,
    pub customer_ip: Option<String>,
}

/// Parameters for initiating a provider-hosted single-buy.
#[derive(Debug, Clone)]
pub struct SingleBuyRequest {
    pub payment_ref: PaymentRef,
    pub amount: Money,
    pub description: String,
    pub return_url: String,
    pub cancel_url: Option<String>,
    /// Capture through the Zimple wallet instead of a card.
    pub zimple: bool,
    /// Extra provider data; carries the wallet phone number for Zimple.
    pub additional_data: String,
    pub user_id: Option<UserId>,
    pub customer_ip: Option<String>,
}

/// Reconciler, generic over the store and gateway ports.
pub struct Reconciler<S: PaymentStore, G: PaymentGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    ledger: TransactionLedger<S>,
    events: broadcast::Sender<TransactionEvent>,
}

impl<S: PaymentStore, G: PaymentGateway> Reconciler<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger: TransactionLedger::new(Arc::clone(&store)),
            store,
            gateway,
            events,
        }
    }

    /// Subscribes to transaction update events published by the callback
    /// flow.
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.events.subscribe()
    }

    /// Access to the underlying ledger.
    pub fn ledger(&self) -> &TransactionLedger<S> {
        &self.ledger
    }

    /// Captures a payment against a registered card.
    ///
    /// The card's alias is re-read from the provider listing before the
    /// charge; a locally stored alias may have been revoked provider-side.
    #[tracing::instrument(skip(self, req), fields(user_id = %req.user_id, card_id = %req.card_id))]
    pub async fn charge(&self, req: ChargeRequest) -> Result<ChargeResponse, AppError> {
        let card = self
            .store
            .get_card(req.user_id, req.card_id)
            .await?
            .ok_or(DomainError::CardNotFound(req.card_id))?;
        let listed = self
            .gateway
            .user_card(req.user_id, card.id)
            .await?
            .ok_or(DomainError::CardNotFound(card.id))?;

        let tx = self
            .ledger
            .open(NewTransaction {
                user_id: Some(req.user_id),
                payment_ref: Some(req.payment_ref),
                card_id: Some(card.id),
                amount: req.amount,
                description: req.description.clone(),
                customer_ip: req.customer_ip,
            })
            .await?;

        let order = ChargeOrder {
            transaction_id: tx.id,
            amount: req.amount,
            description: req.description,
            alias_token: listed.alias_token,
            installments: req.installments.unwrap_or(1),
        };
        let tx = match self.gateway.charge(&order).await {
            Ok(outcome) => self
                .ledger
                .apply_gateway_result(tx.id, &outcome)
                .await
                .map_err(AppError::from)?,
            Err(GatewayError::Rejected(msg)) => {
                tracing::warn!(transaction_id = %tx.id, %msg, "charge rejected by provider");
                self.ledger.mark_failed(tx.id, msg).await?
            }
            // Transport failure: the transaction stays pending and the
            // caller retries or polls later.
            Err(err) => return Err(err.into()),
        };
        Ok(ChargeResponse::from(&tx))
    }

    /// Opens a cardless transaction and requests the provider's hosted
    /// single-buy process handle.
    #[tracing::instrument(skip(self, req), fields(payment_ref = %req.payment_ref))]
    pub async fn init_single_buy(&self, req: SingleBuyRequest) -> Result<SingleBuyStart, AppError> {
        let tx = self
            .ledger
            .open(NewTransaction {
                user_id: req.user_id,
                payment_ref: Some(req.payment_ref),
                card_id: None,
                amount: req.amount,
                description: req.description.clone(),
                customer_ip: req.customer_ip,
            })
            .await?;

        let order = SingleBuyOrder {
            transaction_id: tx.id,
            amount: req.amount,
            description: req.description,
            return_url: req.return_url,
            cancel_url: req.cancel_url,
            zimple: req.zimple,
            additional_data: req.additional_data,
        };
        match self.gateway.init_single_buy(&order).await {
            Ok(process) => Ok(SingleBuyStart {
                transaction_id: tx.id,
                process_id: process.0,
            }),
            Err(GatewayError::Rejected(msg)) => {
                self.ledger.mark_failed(tx.id, msg.clone()).await?;
                Err(AppError::BadRequest(msg))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reports a transaction's outcome, polling the provider when it is
    /// still pending.
    ///
    /// Resolves by explicit id, or the latest pending transaction for the
    /// payment reference. Terminal transactions are returned as-is without
    /// touching the provider. Losing the race against a concurrent callback
    /// is a no-op: the settled record is returned.
    #[tracing::instrument(skip(self))]
    pub async fn transaction_status(
        &self,
        payment_ref: PaymentRef,
        tx_id: Option<TransactionId>,
    ) -> Result<Option<ChargeResponse>, AppError> {
        let Some(tx) = self
            .ledger
            .resolve(payment_ref, tx_id, TransactionStatus::Pending)
            .await?
        else {
            return Ok(None);
        };
        if tx.status.is_terminal() {
            return Ok(Some(ChargeResponse::from(&tx)));
        }

        let tx = match self.gateway.poll_confirmation(tx.id).await {
            Ok(outcome) => self.apply_or_reload(tx.id, &outcome).await?,
            Err(GatewayError::Rejected(msg)) => self.ledger.mark_failed(tx.id, msg).await?,
            Err(err) => return Err(err.into()),
        };
        Ok(Some(ChargeResponse::from(&tx)))
    }

    /// Attempts to reverse a captured transaction.
    ///
    /// Resolves by explicit id, or the latest successful transaction for the
    /// payment reference. Every attempt leaves a reversion record. The
    /// same-day policy is checked locally before the provider is contacted;
    /// a policy refusal fails the reversion with a fixed message and leaves
    /// the transaction untouched.
    #[tracing::instrument(skip(self))]
    pub async fn reverse(
        &self,
        payment_ref: PaymentRef,
        tx_id: Option<TransactionId>,
    ) -> Result<ReversalResponse, AppError> {
        let tx = self
            .ledger
            .resolve(payment_ref, tx_id, TransactionStatus::Success)
            .await?
            .ok_or(DomainError::TransactionNotFound)?;
        if tx.status != TransactionStatus::Success {
            return Err(DomainError::NotReversible(tx.id).into());
        }

        let reversion = self.store.create_reversion(tx.id).await?;

        if Utc::now().date_naive() > tx.created_at.date_naive() {
            let reversion = self
                .store
                .finalize_reversion(
                    reversion.id,
                    ReversionStatus::Fail,
                    SAME_DAY_MESSAGE.to_string(),
                    Value::Null,
                )
                .await?;
            tracing::warn!(transaction_id = %tx.id, "reversal refused by same-day policy");
            return Ok(ReversalResponse {
                transaction_id: tx.id,
                status: reversion.status,
                response_description: reversion.response_description,
            });
        }

        match self.gateway.rollback(tx.id).await {
            Ok(outcome) => {
                let status = if outcome.success {
                    ReversionStatus::Success
                } else {
                    ReversionStatus::Fail
                };
                let reversion = self
                    .store
                    .finalize_reversion(reversion.id, status, outcome.description, outcome.raw)
                    .await?;
                if outcome.success {
                    self.ledger.mark_reversed(tx.id).await?;
                }
                Ok(ReversalResponse {
                    transaction_id: tx.id,
                    status: reversion.status,
                    response_description: reversion.response_description,
                })
            }
            // Transport failure leaves the reversion pending for a retry;
            // the transaction keeps its status.
            Err(err) => Err(err.into()),
        }
    }

    /// Applies an inbound provider callback.
    ///
    /// The payload is verified against the recomputed digest or the
    /// transaction's stored verification token before anything is written.
    /// A transaction already settled by a poll acknowledges without
    /// rewriting. Returns the sanitized view the caller may expose.
    #[tracing::instrument(skip_all)]
    pub async fn handle_callback(&self, payload: &Value) -> Result<ChargeView, AppError> {
        let claimed = claimed_transaction_id(payload).ok_or(AppError::SignatureMismatch)?;
        let stored = self.ledger.get(claimed).await?;
        let stored_token = stored
            .as_ref()
            .and_then(|tx| tx.verification_token.as_deref());

        let outcome = self.gateway.verify_callback(payload, stored_token)?;
        let tx = stored.ok_or(DomainError::TransactionNotFound)?;

        let (tx, applied) = if tx.status.is_terminal() {
            (tx, false)
        } else {
            match self.ledger.apply_gateway_result(tx.id, &outcome).await {
                Ok(tx) => (tx, true),
                // A concurrent poll settled it first; acknowledge its result.
                Err(RepoError::Domain(DomainError::AlreadyFinal(_))) => {
                    let tx = self
                        .ledger
                        .get(tx.id)
                        .await?
                        .ok_or(DomainError::TransactionNotFound)?;
                    (tx, false)
                }
                Err(err) => return Err(err.into()),
            }
        };

        if applied {
            let view = ChargeResponse::from(&tx).view;
            // Nobody listening is fine.
            let _ = self.events.send(TransactionEvent::new(view.clone()));
            tracing::info!(transaction_id = %tx.id, status = %tx.status, "callback applied");
            return Ok(view);
        }
        tracing::info!(transaction_id = %tx.id, "callback acknowledged without changes");
        Ok(ChargeResponse::from(&tx).view)
    }

    /// Applies a gateway outcome; when a concurrent writer already settled
    /// the transaction, returns the settled record instead.
    async fn apply_or_reload(
        &self,
        id: TransactionId,
        outcome: &GatewayOutcome,
    ) -> Result<Transaction, AppError> {
        match self.ledger.apply_gateway_result(id, outcome).await {
            Ok(tx) => Ok(tx),
            Err(RepoError::Domain(DomainError::AlreadyFinal(_))) => Ok(self
                .ledger
                .get(id)
                .await?
                .ok_or(DomainError::TransactionNotFound)?),
            Err(err) => Err(err.into()),
        }
    }
}

/// The transaction id an unverified payload claims to settle. Needed before
/// verification so the stored token can be loaded.
fn claimed_transaction_id(payload: &Value) -> Option<TransactionId> {
    let operation = payload
        .get("operation")
        .or_else(|| payload.get("confirmation"))?;
    match operation.get("shop_process_id")? {
        Value::Number(n) => n.as_i64().map(TransactionId::new),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
