//! SQLite store adapter.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;

use vpos_types::{
    Card, CardDetails, CardId, DomainError, NewTransaction, PaymentRef, PaymentStore, RepoError,
    Reversion, ReversionId, ReversionStatus, Transaction, TransactionId, TransactionStatus,
    TransactionUpdate, UserId,
};

use crate::types::{DbCard, DbReversion, DbTransaction};

const CARD_COLUMNS: &str = "id, user_id, last4, exp_year, exp_month, brand, card_type, \
     alias_token, is_active, is_default, created_at, updated_at";

const TX_COLUMNS: &str = "id, user_id, payment_ref, card_id, amount, status, customer_ip, \
     description, response_description, authorization_code, risk_index, verification_token, \
     raw_response, created_at, updated_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite store implementation.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_tables.sql");
        sqlx::query(ddl).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Registers a user id supplied by the host application. Idempotent.
    pub async fn ensure_user(&self, user: UserId) -> Result<(), RepoError> {
        sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)")
            .bind(user.value())
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(())
    }

    async fn fetch_card(&self, card: CardId) -> Result<Option<Card>, RepoError> {
        let row: Option<DbCard> =
            sqlx::query_as(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?"))
                .bind(card.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbCard::into_domain).transpose()
    }

    async fn fetch_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> =
            sqlx::query_as(&format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?"))
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbTransaction::into_domain).transpose()
    }

    /// Distinguishes a missing row from a status-guard miss after a guarded
    /// UPDATE touched zero rows.
    async fn guard_failure(&self, id: TransactionId) -> RepoError {
        match self.fetch_transaction(id).await {
            Ok(Some(tx)) => RepoError::Conflict(format!(
                "transaction {id} already holds status {}",
                tx.status
            )),
            Ok(None) => RepoError::Domain(DomainError::TransactionNotFound),
            Err(e) => e,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentStore for SqliteStore {
    async fn user_exists(&self, user: UserId) -> Result<bool, RepoError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(found.is_some())
    }

    async fn create_card(&self, user: UserId, is_default: bool) -> Result<Card, RepoError> {
        if !self.user_exists(user).await? {
            return Err(RepoError::Domain(DomainError::UserNotFound(user)));
        }
        let mut card = Card::shell(CardId::new(0), user, is_default);
        let result = sqlx::query(
            r#"INSERT INTO cards (user_id, is_active, is_default, created_at, updated_at)
               VALUES (?, 0, ?, ?, ?)"#,
        )
        .bind(user.value())
        .bind(is_default as i64)
        .bind(card.created_at.to_rfc3339())
        .bind(card.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        card.id = CardId::new(result.last_insert_rowid());
        Ok(card)
    }

    async fn get_card(&self, user: UserId, card: CardId) -> Result<Option<Card>, RepoError> {
        let row: Option<DbCard> = sqlx::query_as(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE id = ? AND user_id = ?"
        ))
        .bind(card.value())
        .bind(user.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbCard::into_domain).transpose()
    }

    async fn list_active_cards(&self, user: UserId) -> Result<Vec<Card>, RepoError> {
        let rows: Vec<DbCard> = sqlx::query_as(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE user_id = ? AND is_active = 1 ORDER BY id ASC"
        ))
        .bind(user.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        rows.into_iter().map(DbCard::into_domain).collect()
    }

    async fn latest_inactive_card(&self, user: UserId) -> Result<Option<Card>, RepoError> {
        let row: Option<DbCard> = sqlx::query_as(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE user_id = ? AND is_active = 0 \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(user.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbCard::into_domain).transpose()
    }

    async fn activate_card(&self, card: CardId, details: CardDetails) -> Result<Card, RepoError> {
        let result = sqlx::query(
            r#"UPDATE cards
               SET last4 = ?, exp_year = ?, exp_month = ?, brand = ?, card_type = ?,
                   alias_token = ?, is_active = 1, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&details.last4)
        .bind(details.exp_year as i64)
        .bind(details.exp_month as i64)
        .bind(&details.brand)
        .bind(&details.card_type)
        .bind(&details.alias_token)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(card.value())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Domain(DomainError::CardNotFound(card)));
        }
        self.fetch_card(card)
            .await?
            .ok_or(RepoError::Domain(DomainError::CardNotFound(card)))
    }

    async fn default_card(&self, user: UserId) -> Result<Option<Card>, RepoError> {
        let row: Option<DbCard> = sqlx::query_as(&format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE user_id = ? AND is_active = 1 AND is_default = 1 LIMIT 1"
        ))
        .bind(user.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbCard::into_domain).transpose()
    }

    async fn set_default_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let eligible: Option<i64> =
            sqlx::query_scalar("SELECT id FROM cards WHERE id = ? AND user_id = ? AND is_active = 1")
                .bind(card.value())
                .bind(user.value())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        if eligible.is_none() {
            return Ok(false);
        }

        // Clear-then-set as one statement over the user's active cards.
        sqlx::query(
            r#"UPDATE cards
               SET is_default = CASE WHEN id = ? THEN 1 ELSE 0 END, updated_at = ?
               WHERE user_id = ? AND is_active = 1"#,
        )
        .bind(card.value())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(user.value())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn delete_card(&self, user: UserId, card: CardId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM cards WHERE id = ? AND user_id = ?")
            .bind(card.value())
            .bind(user.value())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, RepoError> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO transactions
               (user_id, payment_ref, card_id, amount, status, customer_ip, description,
                raw_response, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'pending', ?, ?, 'null', ?, ?)"#,
        )
        .bind(new.user_id.map(|u| u.value()))
        .bind(new.payment_ref.map(|p| p.value()))
        .bind(new.card_id.map(|c| c.value()))
        .bind(new.amount.minor())
        .bind(&new.customer_ip)
        .bind(&new.description)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Transaction {
            id: TransactionId::new(result.last_insert_rowid()),
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
        })
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        self.fetch_transaction(id).await
    }

    async fn latest_by_status(
        &self,
        payment_ref: PaymentRef,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {TX_COLUMNS} FROM transactions \
             WHERE payment_ref = ? AND status = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(payment_ref.value())
        .bind(status.as_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        row.map(DbTransaction::into_domain).transpose()
    }

    async fn finalize_transaction(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction, RepoError> {
        let raw = serde_json::to_string(&update.raw_response)
            .map_err(|e| RepoError::Database(e.to_string()))?;
        // Status guard and write-once token live in the statement itself so
        // a racing poll and callback cannot interleave between check and set.
        let result = sqlx::query(
            r#"UPDATE transactions
               SET status = ?, response_description = ?, authorization_code = ?,
                   risk_index = ?, verification_token = COALESCE(verification_token, ?),
                   raw_response = ?, updated_at = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(update.status.as_ref())
        .bind(&update.response_description)
        .bind(&update.authorization_code)
        .bind(update.risk_index.as_ref())
        .bind(&update.verification_token)
        .bind(&raw)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_failure(id).await);
        }
        self.fetch_transaction(id)
            .await?
            .ok_or(RepoError::Domain(DomainError::TransactionNotFound))
    }

    async fn mark_reversed(&self, id: TransactionId) -> Result<Transaction, RepoError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'reversed', updated_at = ? \
             WHERE id = ? AND status = 'success'",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_failure(id).await);
        }
        self.fetch_transaction(id)
            .await?
            .ok_or(RepoError::Domain(DomainError::TransactionNotFound))
    }

    async fn create_reversion(&self, tx: TransactionId) -> Result<Reversion, RepoError> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO reversions (transaction_id, status, raw_response, created_at)
               VALUES (?, 'pending', 'null', ?)"#,
        )
        .bind(tx.value())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Reversion {
            id: ReversionId::new(result.last_insert_rowid()),
            transaction_id: tx,
            status: ReversionStatus::Pending,
            response_description: String::new(),
            raw_response: serde_json::Value::Null,
            created_at: now,
        })
    }

    async fn finalize_reversion(
        &self,
        id: ReversionId,
        status: ReversionStatus,
        description: String,
        raw: serde_json::Value,
    ) -> Result<Reversion, RepoError> {
        let raw_str =
            serde_json::to_string(&raw).map_err(|e| RepoError::Database(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE reversions SET status = ?, response_description = ?, raw_response = ? \
             WHERE id = ?",
        )
        .bind(status.as_ref())
        .bind(&description)
        .bind(&raw_str)
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        let row: DbReversion = sqlx::query_as(
            "SELECT id, transaction_id, status, response_description, raw_response, created_at \
             FROM reversions WHERE id = ?",
        )
        .bind(id.value())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        row.into_domain()
    }
}
