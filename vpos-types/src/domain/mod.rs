//! Domain models for the vPOS merchant integration.

pub mod card;
pub mod event;
pub mod ids;
pub mod money;
pub mod reversion;
pub mod transaction;

pub use card::{Card, CardDetails};
pub use event::TransactionEvent;
pub use ids::{CardId, PaymentRef, ReversionId, TransactionId, UserId};
pub use money::{CURRENCY, Money};
pub use reversion::{Reversion, ReversionStatus};
pub use transaction::{
    NewTransaction, RiskIndex, Transaction, TransactionStatus, TransactionUpdate,
};
