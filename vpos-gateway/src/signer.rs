//! Request digests for the provider protocol.
//!
//! Every operation carries a `token` field: the MD5 hex digest of the shared
//! private key concatenated with operation-specific fields in a fixed order,
//! some including a literal operation-name tag. MD5 with plain-equality
//! verification is the provider's documented scheme.
//!
//! One function per operation type, never a generic builder: the field order
//! differs per operation.

use md5::{Digest, Md5};

use vpos_types::{CardId, TransactionId, UserId};

/// Computes per-operation digests from the merchant's private key.
#[derive(Clone)]
pub struct Signer {
    private_key: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the private key through Debug output.
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
        }
    }

    fn digest(&self, parts: &[&str]) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.private_key.as_bytes());
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// `private_key + card_id + user_id + "request_new_card"`
    pub fn card_registration(&self, card: CardId, user: UserId) -> String {
        self.digest(&[&card.to_string(), &user.to_string(), "request_new_card"])
    }

    /// `private_key + user_id + "request_user_cards"`
    pub fn user_cards(&self, user: UserId) -> String {
        self.digest(&[&user.to_string(), "request_user_cards"])
    }

    /// `private_key + "delete_card" + user_id + alias_token`
    pub fn card_delete(&self, user: UserId, alias_token: &str) -> String {
        self.digest(&["delete_card", &user.to_string(), alias_token])
    }

    /// `private_key + tx_id + "charge" + amount + "PYG" + alias_token`
    pub fn charge(&self, tx: TransactionId, amount: &str, alias_token: &str) -> String {
        self.digest(&[&tx.to_string(), "charge", amount, "PYG", alias_token])
    }

    /// `private_key + tx_id + amount + "PYG"`
    pub fn single_buy(&self, tx: TransactionId, amount: &str) -> String {
        self.digest(&[&tx.to_string(), amount, "PYG"])
    }

    /// `private_key + tx_id + "get_confirmation"`
    pub fn confirmation(&self, tx: TransactionId) -> String {
        self.digest(&[&tx.to_string(), "get_confirmation"])
    }

    /// `private_key + tx_id + "rollback" + "0.00"`
    pub fn rollback(&self, tx: TransactionId) -> String {
        self.digest(&[&tx.to_string(), "rollback", "0.00"])
    }

    /// `private_key + tx_id + "confirm" + amount + currency`
    pub fn callback(&self, tx: TransactionId, amount: &str, currency: &str) -> String {
        self.digest(&[&tx.to_string(), "confirm", amount, currency])
    }

    /// Checks a supplied callback digest against the recomputed value.
    pub fn verify_callback(
        &self,
        supplied: &str,
        tx: TransactionId,
        amount: &str,
        currency: &str,
    ) -> bool {
        supplied == self.callback(tx, amount, currency)
    }
}
