//! Transaction ledger service.
//!
//! Sole owner of transaction state transitions. Every transaction is opened
//! `pending` here, and every terminal transition passes through the store's
//! guarded updates, so a stale gateway result can never overwrite a settled
//! record.
//!
//! Methods return store-level errors so the reconciler can tell a losing
//! race (`AlreadyFinal`) apart from genuine failures.

use std::sync::Arc;

use vpos_types::{
    DomainError, GatewayOutcome, NewTransaction, PaymentRef, PaymentStore, RepoError, Transaction,
    TransactionId, TransactionStatus, TransactionUpdate,
};

/// Transaction ledger, generic over the store port.
pub struct TransactionLedger<S: PaymentStore> {
    store: Arc<S>,
}

impl<S: PaymentStore> TransactionLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Opens a transaction in `pending`.
    pub async fn open(&self, new: NewTransaction) -> Result<Transaction, RepoError> {
        let tx = self.store.create_transaction(new).await?;
        tracing::info!(transaction_id = %tx.id, amount = %tx.amount.to_wire(), "transaction opened");
        Ok(tx)
    }

    /// Fetches a transaction by id.
    pub async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        self.store.get_transaction(id).await
    }

    /// Resolves a transaction: by explicit id when given, otherwise the
    /// latest transaction with `status` for the payment reference.
    pub async fn resolve(
        &self,
        payment_ref: PaymentRef,
        tx: Option<TransactionId>,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, RepoError> {
        match tx {
            Some(id) => self.store.get_transaction(id).await,
            None => self.store.latest_by_status(payment_ref, status).await,
        }
    }

    /// Transcribes a gateway outcome onto a still-pending transaction.
    ///
    /// A transaction that already settled fails with `AlreadyFinal`; callers
    /// racing each other treat that as "somebody else won".
    pub async fn apply_gateway_result(
        &self,
        id: TransactionId,
        outcome: &GatewayOutcome,
    ) -> Result<Transaction, RepoError> {
        let update = TransactionUpdate {
            status: if outcome.success {
                TransactionStatus::Success
            } else {
                TransactionStatus::Fail
            },
            response_description: outcome.description.clone(),
            authorization_code: outcome.authorization_code.clone(),
            risk_index: outcome.risk_index,
            verification_token: outcome.verification_token.clone(),
            raw_response: outcome.raw.clone(),
        };
        match self.store.finalize_transaction(id, update).await {
            Err(RepoError::Conflict(_)) => Err(DomainError::AlreadyFinal(id).into()),
            other => other,
        }
    }

    /// Records a terminal failure for a definitive provider rejection that
    /// carried no transaction outcome body.
    pub async fn mark_failed(
        &self,
        id: TransactionId,
        description: impl Into<String>,
    ) -> Result<Transaction, RepoError> {
        match self
            .store
            .finalize_transaction(id, TransactionUpdate::failed(description))
            .await
        {
            Err(RepoError::Conflict(_)) => Err(DomainError::AlreadyFinal(id).into()),
            other => other,
        }
    }

    /// Flips a successful transaction to `reversed`.
    pub async fn mark_reversed(&self, id: TransactionId) -> Result<Transaction, RepoError> {
        match self.store.mark_reversed(id).await {
            Err(RepoError::Conflict(_)) => Err(DomainError::NotReversible(id).into()),
            other => other,
        }
    }
}
