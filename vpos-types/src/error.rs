//! Error types for the vPOS integration.

use crate::domain::{CardId, TransactionId, UserId};
use crate::ports::GatewayError;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Malformed amount: {0}")]
    MalformedAmount(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("No registration pending confirmation for user {0}")]
    RegistrationNotFound(UserId),

    #[error("Transaction {0} already holds a terminal status")]
    AlreadyFinal(TransactionId),

    #[error("Transaction {0} is not reversible in its current status")]
    NotReversible(TransactionId),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for the caller-facing surface).
///
/// Maps cleanly to HTTP status codes in the inbound adapter.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure talking to the provider. Retry-eligible; the
    /// affected transaction, if any, is left pending.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Inbound callback failed both verification checks.
    #[error("Callback signature mismatch")]
    SignatureMismatch,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::UserNotFound(id)) => {
                AppError::NotFound(format!("User not found: {id}"))
            }
            RepoError::Domain(DomainError::CardNotFound(id)) => {
                AppError::NotFound(format!("Card not found: {id}"))
            }
            RepoError::Domain(DomainError::TransactionNotFound) => {
                AppError::NotFound("Transaction not found".into())
            }
            RepoError::Domain(DomainError::RegistrationNotFound(id)) => {
                AppError::NotFound(format!("No registration pending for user {id}"))
            }
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::BadRequest(e),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::from(RepoError::Domain(err))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => AppError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => AppError::BadRequest(msg),
            GatewayError::SignatureMismatch => AppError::SignatureMismatch,
        }
    }
}
