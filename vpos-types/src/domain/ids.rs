//! Identifier newtypes.
//!
//! All identifiers are merchant-side integers. The transaction identifier is
//! also sent to the provider as the `shop_process_id` idempotency key.

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

id_newtype!(
    /// Identifier of a user in the host application.
    UserId
);
id_newtype!(
    /// Identifier of a registered card.
    CardId
);
id_newtype!(
    /// Identifier of a transaction, used as the gateway `shop_process_id`.
    TransactionId
);
id_newtype!(
    /// External payment reference a transaction is attached to.
    PaymentRef
);
id_newtype!(
    /// Identifier of a reversion attempt.
    ReversionId
);
