//! Transaction update events.
//!
//! The reconciler publishes one event per applied callback on a broadcast
//! channel. Publishing through a single channel preserves delivery order per
//! transaction identifier for every subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TransactionId;
use crate::dto::ChargeView;

/// Emitted after an inbound callback has been applied to a transaction.
///
/// Carries only the sanitized projection; private provider data
/// (authorization code, risk classification) never rides on events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_id: TransactionId,
    pub view: ChargeView,
    pub occurred_at: DateTime<Utc>,
}

impl TransactionEvent {
    pub fn new(view: ChargeView) -> Self {
        Self {
            transaction_id: view.transaction_id,
            view,
            occurred_at: Utc::now(),
        }
    }
}
