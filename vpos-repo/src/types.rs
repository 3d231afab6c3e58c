//! Database row types and conversions to domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use vpos_types::{
    Card, CardId, Money, PaymentRef, RepoError, Reversion, ReversionId, ReversionStatus,
    RiskIndex, Transaction, TransactionId, TransactionStatus, UserId,
};

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::Database(format!("invalid timestamp {raw:?}: {e}")))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, RepoError> {
    serde_json::from_str(raw).map_err(|e| RepoError::Database(format!("invalid stored JSON: {e}")))
}

/// Database card row.
#[derive(Debug, FromRow)]
pub struct DbCard {
    pub id: i64,
    pub user_id: i64,
    pub last4: String,
    pub exp_year: i64,
    pub exp_month: i64,
    pub brand: String,
    pub card_type: String,
    pub alias_token: Option<String>,
    pub is_active: i64,
    pub is_default: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl DbCard {
    pub fn into_domain(self) -> Result<Card, RepoError> {
        Ok(Card {
            id: CardId::new(self.id),
            user_id: UserId::new(self.user_id),
            last4: self.last4,
            exp_year: self.exp_year as u16,
            exp_month: self.exp_month as u8,
            brand: self.brand,
            card_type: self.card_type,
            alias_token: self.alias_token,
            is_active: self.is_active != 0,
            is_default: self.is_default != 0,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Database transaction row.
#[derive(Debug, FromRow)]
pub struct DbTransaction {
    pub id: i64,
    pub user_id: Option<i64>,
    pub payment_ref: Option<i64>,
    pub card_id: Option<i64>,
    pub amount: i64,
    pub status: String,
    pub customer_ip: Option<String>,
    pub description: String,
    pub response_description: String,
    pub authorization_code: String,
    pub risk_index: String,
    pub verification_token: Option<String>,
    pub raw_response: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DbTransaction {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let status: TransactionStatus =
            self.status.parse().map_err(RepoError::Database)?;
        let risk_index: RiskIndex = self.risk_index.parse().map_err(RepoError::Database)?;
        Ok(Transaction {
            id: TransactionId::new(self.id),
            user_id: self.user_id.map(UserId::new),
            payment_ref: self.payment_ref.map(PaymentRef::new),
            card_id: self.card_id.map(CardId::new),
            amount: Money::from_minor(self.amount)?,
            status,
            customer_ip: self.customer_ip,
            description: self.description,
            response_description: self.response_description,
            authorization_code: self.authorization_code,
            risk_index,
            verification_token: self.verification_token,
            raw_response: parse_json(&self.raw_response)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Database reversion row.
#[derive(Debug, FromRow)]
pub struct DbReversion {
    pub id: i64,
    pub transaction_id: i64,
    pub status: String,
    pub response_description: String,
    pub raw_response: String,
    pub created_at: String,
}

impl DbReversion {
    pub fn into_domain(self) -> Result<Reversion, RepoError> {
        let status: ReversionStatus = self.status.parse().map_err(RepoError::Database)?;
        Ok(Reversion {
            id: ReversionId::new(self.id),
            transaction_id: TransactionId::new(self.transaction_id),
            status,
            response_description: self.response_description,
            raw_response: parse_json(&self.raw_response)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
