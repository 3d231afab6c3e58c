//! Persistence port.
//!
//! This is the primary port in the hexagonal architecture. Adapters
//! (in-memory, SQLite) implement this trait; the application layer never
//! assumes a specific storage engine.

use crate::domain::{
    Card, CardDetails, CardId, NewTransaction, PaymentRef, Reversion, ReversionId,
    ReversionStatus, Transaction, TransactionId, TransactionStatus, TransactionUpdate, UserId,
};
use crate::error::RepoError;

/// Store contract for cards, transactions and reversions.
///
/// Two operations carry atomicity requirements:
/// - `set_default_card` MUST clear-then-set as one per-user atomic update so
///   concurrent callers can never leave two defaults behind.
/// - `finalize_transaction` MUST transition only a still-pending row and
///   report `Conflict` otherwise, so a poll racing a callback cannot
///   overwrite a terminal status.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// True if the user is known to the host application.
    async fn user_exists(&self, user: UserId) -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Cards
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the inactive shell card recorded when registration begins.
    async fn create_card(&self, user: UserId, is_default: bool) -> Result<Card, RepoError>;

    /// Fetches a card owned by the user.
    async fn get_card(&self, user: UserId, card: CardId) -> Result<Option<Card>, RepoError>;

    /// Lists the user's active cards, oldest first.
    async fn list_active_cards(&self, user: UserId) -> Result<Vec<Card>, RepoError>;

    /// The most recently created inactive card for the user, if any.
    async fn latest_inactive_card(&self, user: UserId) -> Result<Option<Card>, RepoError>;

    /// Populates provider detail and activates a shell card.
    async fn activate_card(&self, card: CardId, details: CardDetails) -> Result<Card, RepoError>;

    /// The user's active default card, if any.
    async fn default_card(&self, user: UserId) -> Result<Option<Card>, RepoError>;

    /// Atomically makes the given active card the user's only default.
    /// Returns false if the card is not an active card of that user.
    async fn set_default_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError>;

    /// Removes a card. Returns false if absent. Callers must have obtained
    /// provider-side deletion confirmation first.
    async fn delete_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions (per-transaction transitions MUST be guarded)
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a transaction in `pending`.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, RepoError>;

    /// Fetches a transaction by id.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// The most recently created transaction with the given status for the
    /// payment reference.
    async fn latest_by_status(
        &self,
        payment_ref: PaymentRef,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, RepoError>;

    /// Applies a terminal update to a still-pending transaction. The
    /// verification token is write-once: an already-set token is preserved.
    /// Fails with `Conflict` if the transaction is no longer pending.
    async fn finalize_transaction(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction, RepoError>;

    /// Transitions `success -> reversed`. Fails with `Conflict` for any
    /// other starting status.
    async fn mark_reversed(&self, id: TransactionId) -> Result<Transaction, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reversions
    // ─────────────────────────────────────────────────────────────────────────

    /// Records a new pending reversion attempt for a transaction.
    async fn create_reversion(&self, tx: TransactionId) -> Result<Reversion, RepoError>;

    /// Records the outcome of a reversion attempt.
    async fn finalize_reversion(
        &self,
        id: ReversionId,
        status: ReversionStatus,
        description: String,
        raw: serde_json::Value,
    ) -> Result<Reversion, RepoError>;
}
