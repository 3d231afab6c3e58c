//! Card domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CardId, UserId};

/// A credit/debit card registered with the provider on behalf of a user.
///
/// A card starts life as an inactive, tokenless shell when registration is
/// initiated. It is populated with provider detail and activated once the
/// provider confirms the registration, and deleted only after the provider
/// confirms deletion of its alias token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    /// Unique identifier, also sent to the provider during registration.
    pub id: CardId,
    /// Owning user.
    pub user_id: UserId,
    /// Last four digits of the masked card number.
    pub last4: String,
    /// Expiry year.
    pub exp_year: u16,
    /// Expiry month (1-12).
    pub exp_month: u8,
    /// Card brand as reported by the provider.
    pub brand: String,
    /// Card type (credit/debit) as reported by the provider.
    pub card_type: String,
    /// Provider-issued opaque token standing in for the real PAN.
    pub alias_token: Option<String>,
    /// True once the provider has confirmed the registration.
    pub is_active: bool,
    /// At most one active card per user carries this flag.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Creates the inactive shell recorded when registration begins.
    pub fn shell(id: CardId, user_id: UserId, is_default: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            last4: String::new(),
            exp_year: 0,
            exp_month: 0,
            brand: String::new(),
            card_type: String::new(),
            alias_token: None,
            is_active: false,
            is_default,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies provider-confirmed detail and activates the card.
    pub fn activate(&mut self, details: CardDetails) {
        self.last4 = details.last4;
        self.exp_year = details.exp_year;
        self.exp_month = details.exp_month;
        self.brand = details.brand;
        self.card_type = details.card_type;
        self.alias_token = Some(details.alias_token);
        self.is_active = true;
        self.updated_at = Utc::now();
    }
}

/// Provider-confirmed card detail used to activate a shell card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub last4: String,
    pub exp_year: u16,
    pub exp_month: u8,
    pub brand: String,
    pub card_type: String,
    pub alias_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_is_inactive_and_tokenless() {
        let card = Card::shell(CardId::new(1), UserId::new(42), true);
        assert!(!card.is_active);
        assert!(card.alias_token.is_none());
        assert!(card.is_default);
    }

    #[test]
    fn test_activate_populates_detail() {
        let mut card = Card::shell(CardId::new(1), UserId::new(42), false);
        card.activate(CardDetails {
            last4: "4321".into(),
            exp_year: 2028,
            exp_month: 11,
            brand: "VISA".into(),
            card_type: "credit".into(),
            alias_token: "alias-xyz".into(),
        });
        assert!(card.is_active);
        assert_eq!(card.last4, "4321");
        assert_eq!(card.alias_token.as_deref(), Some("alias-xyz"));
    }
}
