//! In-memory store adapter.
//!
//! Backs tests and ephemeral setups. Atomicity is provided by a per-user
//! mutex for default-card updates and by DashMap's per-entry locking for
//! transaction status transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use vpos_types::{
    Card, CardDetails, CardId, DomainError, NewTransaction, PaymentRef, PaymentStore, RepoError,
    Reversion, ReversionId, ReversionStatus, Transaction, TransactionId, TransactionStatus,
    TransactionUpdate, UserId,
};

/// In-memory store implementation.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, ()>,
    cards: DashMap<CardId, Card>,
    transactions: DashMap<TransactionId, Transaction>,
    reversions: DashMap<ReversionId, Reversion>,
    /// Serializes default-card updates per user.
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    next_card_id: AtomicI64,
    next_tx_id: AtomicI64,
    next_reversion_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user id supplied by the host application. Idempotent.
    pub fn add_user(&self, user: UserId) {
        self.users.insert(user, ());
    }

    fn user_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(user).or_default().clone()
    }

    /// Rewrites a transaction's creation time. Test support for time-windowed
    /// policies. Returns false if the transaction does not exist.
    pub fn backdate_transaction(
        &self,
        id: TransactionId,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        match self.transactions.get_mut(&id) {
            Some(mut tx) => {
                tx.created_at = created_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn user_exists(&self, user: UserId) -> Result<bool, RepoError> {
        Ok(self.users.contains_key(&user))
    }

    async fn create_card(&self, user: UserId, is_default: bool) -> Result<Card, RepoError> {
        if !self.users.contains_key(&user) {
            return Err(RepoError::Domain(DomainError::UserNotFound(user)));
        }
        let id = CardId::new(self.next_card_id.fetch_add(1, Ordering::SeqCst) + 1);
        let card = Card::shell(id, user, is_default);
        self.cards.insert(id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, user: UserId, card: CardId) -> Result<Option<Card>, RepoError> {
        Ok(self
            .cards
            .get(&card)
            .filter(|c| c.user_id == user)
            .map(|c| c.clone()))
    }

    async fn list_active_cards(&self, user: UserId) -> Result<Vec<Card>, RepoError> {
        let mut cards: Vec<Card> = self
            .cards
            .iter()
            .filter(|c| c.user_id == user && c.is_active)
            .map(|c| c.clone())
            .collect();
        cards.sort_by_key(|c| c.id);
        Ok(cards)
    }

    async fn latest_inactive_card(&self, user: UserId) -> Result<Option<Card>, RepoError> {
        Ok(self
            .cards
            .iter()
            .filter(|c| c.user_id == user && !c.is_active)
            .max_by_key(|c| c.id)
            .map(|c| c.clone()))
    }

    async fn activate_card(&self, card: CardId, details: CardDetails) -> Result<Card, RepoError> {
        let mut entry = self
            .cards
            .get_mut(&card)
            .ok_or(RepoError::Domain(DomainError::CardNotFound(card)))?;
        entry.activate(details);
        Ok(entry.clone())
    }

    async fn default_card(&self, user: UserId) -> Result<Option<Card>, RepoError> {
        Ok(self
            .cards
            .iter()
            .find(|c| c.user_id == user && c.is_active && c.is_default)
            .map(|c| c.clone()))
    }

    async fn set_default_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let eligible = self
            .cards
            .get(&card)
            .is_some_and(|c| c.user_id == user && c.is_active);
        if !eligible {
            return Ok(false);
        }
        // Touch each of the user's active cards; exactly one ends up default.
        let ids: Vec<CardId> = self
            .cards
            .iter()
            .filter(|c| c.user_id == user && c.is_active)
            .map(|c| c.id)
            .collect();
        for id in ids {
            if let Some(mut entry) = self.cards.get_mut(&id) {
                entry.is_default = id == card;
                entry.updated_at = chrono::Utc::now();
            }
        }
        Ok(true)
    }

    async fn delete_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError> {
        let owned = self
            .cards
            .get(&card)
            .is_some_and(|c| c.user_id == user);
        if !owned {
            return Ok(false);
        }
        Ok(self.cards.remove(&card).is_some())
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, RepoError> {
        let id = TransactionId::new(self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = chrono::Utc::now();
        let tx = Transaction {
            id,
            user_id: new.user_id,
            payment_ref: new.payment_ref,
            card_id: new.card_id,
            amount: new.amount,
            status: TransactionStatus::Pending,
            customer_ip: new.customer_ip,
            description: new.description,
            response_description: String::new(),
            authorization_code: String::new(),
            risk_index: Default::default(),
            verification_token: None,
            raw_response: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn latest_by_status(
        &self,
        payment_ref: PaymentRef,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, RepoError> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.payment_ref == Some(payment_ref) && t.status == status)
            .max_by_key(|t| t.id)
            .map(|t| t.clone()))
    }

    async fn finalize_transaction(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction, RepoError> {
        // get_mut holds the shard lock, making check-and-set atomic.
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or(RepoError::Domain(DomainError::TransactionNotFound))?;
        if entry.status.is_terminal() {
            return Err(RepoError::Conflict(format!(
                "transaction {id} already holds status {}",
                entry.status
            )));
        }
        entry.status = update.status;
        entry.response_description = update.response_description;
        entry.authorization_code = update.authorization_code;
        entry.risk_index = update.risk_index;
        if entry.verification_token.is_none() {
            entry.verification_token = update.verification_token;
        }
        entry.raw_response = update.raw_response;
        entry.updated_at = chrono::Utc::now();
        Ok(entry.clone())
    }

    async fn mark_reversed(&self, id: TransactionId) -> Result<Transaction, RepoError> {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or(RepoError::Domain(DomainError::TransactionNotFound))?;
        if entry.status != TransactionStatus::Success {
            return Err(RepoError::Conflict(format!(
                "transaction {id} holds status {}, only success can be reversed",
                entry.status
            )));
        }
        entry.status = TransactionStatus::Reversed;
        entry.updated_at = chrono::Utc::now();
        Ok(entry.clone())
    }

    async fn create_reversion(&self, tx: TransactionId) -> Result<Reversion, RepoError> {
        let id = ReversionId::new(self.next_reversion_id.fetch_add(1, Ordering::SeqCst) + 1);
        let reversion = Reversion {
            id,
            transaction_id: tx,
            status: ReversionStatus::Pending,
            response_description: String::new(),
            raw_response: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
        };
        self.reversions.insert(id, reversion.clone());
        Ok(reversion)
    }

    async fn finalize_reversion(
        &self,
        id: ReversionId,
        status: ReversionStatus,
        description: String,
        raw: serde_json::Value,
    ) -> Result<Reversion, RepoError> {
        let mut entry = self.reversions.get_mut(&id).ok_or(RepoError::NotFound)?;
        entry.status = status;
        entry.response_description = description;
        entry.raw_response = raw;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpos_types::Money;

    fn details(alias: &str) -> CardDetails {
        CardDetails {
            last4: "1234".into(),
            exp_year: 2028,
            exp_month: 11,
            brand: "VISA".into(),
            card_type: "credit".into(),
            alias_token: alias.into(),
        }
    }

    fn new_tx(payment_ref: i64) -> NewTransaction {
        NewTransaction {
            user_id: Some(UserId::new(42)),
            payment_ref: Some(PaymentRef::new(payment_ref)),
            card_id: None,
            amount: Money::from_minor(10_000).unwrap(),
            description: "order".into(),
            customer_ip: None,
        }
    }

    fn approved(token: Option<&str>) -> TransactionUpdate {
        TransactionUpdate {
            status: TransactionStatus::Success,
            response_description: "Transaccion aprobada".into(),
            authorization_code: "A1".into(),
            risk_index: Default::default(),
            verification_token: token.map(str::to_string),
            raw_response: serde_json::Value::Null,
        }
    }

    async fn store_with_user() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user(UserId::new(42));
        store
    }

    #[tokio::test]
    async fn test_card_lifecycle() {
        let store = store_with_user().await;
        let user = UserId::new(42);

        let shell = store.create_card(user, true).await.unwrap();
        assert!(!shell.is_active);
        assert_eq!(store.latest_inactive_card(user).await.unwrap().unwrap().id, shell.id);
        assert!(store.list_active_cards(user).await.unwrap().is_empty());

        let card = store.activate_card(shell.id, details("alias-1")).await.unwrap();
        assert!(card.is_active);
        assert_eq!(store.default_card(user).await.unwrap().unwrap().id, card.id);

        assert!(store.delete_card(user, card.id).await.unwrap());
        assert!(!store.delete_card(user, card.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_card_requires_known_user() {
        let store = MemoryStore::new();
        let err = store.create_card(UserId::new(9), false).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::Domain(DomainError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_default_clears_previous_default() {
        let store = store_with_user().await;
        let user = UserId::new(42);
        let first = store.create_card(user, true).await.unwrap();
        store.activate_card(first.id, details("a-1")).await.unwrap();
        let second = store.create_card(user, false).await.unwrap();
        store.activate_card(second.id, details("a-2")).await.unwrap();

        assert!(store.set_default_card(user, second.id).await.unwrap());

        let cards = store.list_active_cards(user).await.unwrap();
        let defaults: Vec<_> = cards.iter().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
    }

    #[tokio::test]
    async fn test_set_default_rejects_inactive_and_foreign_cards() {
        let store = store_with_user().await;
        store.add_user(UserId::new(7));
        let user = UserId::new(42);

        let inactive = store.create_card(user, false).await.unwrap();
        assert!(!store.set_default_card(user, inactive.id).await.unwrap());

        let foreign = store.create_card(UserId::new(7), false).await.unwrap();
        store.activate_card(foreign.id, details("a-f")).await.unwrap();
        assert!(!store.set_default_card(user, foreign.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_set_default_leaves_one_default() {
        let store = Arc::new(store_with_user().await);
        let user = UserId::new(42);
        let mut card_ids = Vec::new();
        for i in 0..4 {
            let card = store.create_card(user, i == 0).await.unwrap();
            store
                .activate_card(card.id, details(&format!("a-{i}")))
                .await
                .unwrap();
            card_ids.push(card.id);
        }

        let mut handles = Vec::new();
        for round in 0..40 {
            let store = Arc::clone(&store);
            let card = card_ids[round % card_ids.len()];
            handles.push(tokio::spawn(async move {
                store.set_default_card(user, card).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let defaults = store
            .list_active_cards(user)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.is_default)
            .count();
        assert_eq!(defaults, 1);
    }

    #[tokio::test]
    async fn test_finalize_only_from_pending() {
        let store = store_with_user().await;
        let tx = store.create_transaction(new_tx(1)).await.unwrap();

        let updated = store
            .finalize_transaction(tx.id, approved(Some("tok-1")))
            .await
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Success);
        assert_eq!(updated.verification_token.as_deref(), Some("tok-1"));

        let err = store
            .finalize_transaction(tx.id, TransactionUpdate::failed("late result"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        // The original outcome is untouched by the losing write.
        let stored = store.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finalize_race_has_single_winner() {
        let store = Arc::new(store_with_user().await);
        let tx = store.create_transaction(new_tx(2)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.finalize_transaction(tx.id, approved(None)).await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_mark_reversed_requires_success() {
        let store = store_with_user().await;
        let tx = store.create_transaction(new_tx(3)).await.unwrap();

        let err = store.mark_reversed(tx.id).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        store
            .finalize_transaction(tx.id, approved(Some("tok")))
            .await
            .unwrap();
        let reversed = store.mark_reversed(tx.id).await.unwrap();
        assert_eq!(reversed.status, TransactionStatus::Reversed);
        // Token survives the reversal.
        assert_eq!(reversed.verification_token.as_deref(), Some("tok"));

        let err = store.mark_reversed(tx.id).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_latest_by_status_prefers_newest() {
        let store = store_with_user().await;
        let first = store.create_transaction(new_tx(5)).await.unwrap();
        let second = store.create_transaction(new_tx(5)).await.unwrap();
        assert!(second.id > first.id);

        let found = store
            .latest_by_status(PaymentRef::new(5), TransactionStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);

        store
            .finalize_transaction(second.id, approved(None))
            .await
            .unwrap();
        let found = store
            .latest_by_status(PaymentRef::new(5), TransactionStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_reversion_lifecycle() {
        let store = store_with_user().await;
        let tx = store.create_transaction(new_tx(6)).await.unwrap();

        let reversion = store.create_reversion(tx.id).await.unwrap();
        assert_eq!(reversion.status, ReversionStatus::Pending);

        let done = store
            .finalize_reversion(
                reversion.id,
                ReversionStatus::Fail,
                "Transaccion no reversible".into(),
                serde_json::json!({ "status": "error" }),
            )
            .await
            .unwrap();
        assert_eq!(done.status, ReversionStatus::Fail);
        assert_eq!(done.response_description, "Transaccion no reversible");
    }
}
