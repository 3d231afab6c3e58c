//! Reversion domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ReversionId, TransactionId};

/// Outcome state of a reversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReversionStatus {
    #[default]
    Pending,
    Success,
    Fail,
}

impl AsRef<str> for ReversionStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for ReversionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for ReversionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown reversion status: {other}")),
        }
    }
}

/// One attempt to reverse a captured transaction.
///
/// A transaction may accumulate several reversions across retries; only a
/// reversion that succeeds flips its transaction to `reversed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reversion {
    pub id: ReversionId,
    pub transaction_id: TransactionId,
    pub status: ReversionStatus,
    pub response_description: String,
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
