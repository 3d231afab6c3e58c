//! Fixed-point monetary value.
//!
//! The provider transmits amounts as strings with exactly two decimal digits
//! and a fixed `PYG` currency code. Amounts are stored in minor units (one
//! hundredth of a guarani) to avoid floating-point precision issues.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Currency code the provider accepts. Fixed by the protocol.
pub const CURRENCY: &str = "PYG";

/// Fixed-point monetary amount with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units (hundredths).
    pub fn from_minor(minor: i64) -> Result<Self, DomainError> {
        if minor < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self(minor))
    }

    /// Creates a new amount from whole major units.
    pub fn from_major(major: i64) -> Result<Self, DomainError> {
        Self::from_minor(major.saturating_mul(100))
    }

    /// Zero amount.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Formats the amount the way the wire protocol expects: two decimal
    /// digits, no grouping, e.g. `150000.00`.
    pub fn to_wire(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }

    /// Parses a wire amount string (`"1500"`, `"1500.5"`, `"1500.00"`).
    pub fn parse_wire(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        let (major, frac) = match s.split_once('.') {
            Some((major, frac)) => (major, frac),
            None => (s, ""),
        };
        if major.is_empty() && frac.is_empty() {
            return Err(DomainError::MalformedAmount(s.to_string()));
        }
        let major: i64 = if major.is_empty() {
            0
        } else {
            major
                .parse()
                .map_err(|_| DomainError::MalformedAmount(s.to_string()))?
        };
        let minor: i64 = match frac.len() {
            0 => 0,
            1 => {
                10 * frac
                    .parse::<i64>()
                    .map_err(|_| DomainError::MalformedAmount(s.to_string()))?
            }
            2 => frac
                .parse()
                .map_err(|_| DomainError::MalformedAmount(s.to_string()))?,
            _ => return Err(DomainError::MalformedAmount(s.to_string())),
        };
        if major < 0 || s.starts_with('-') {
            return Err(DomainError::NegativeAmount);
        }
        Self::from_minor(major * 100 + minor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_wire(), CURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_has_two_decimals() {
        let amount = Money::from_minor(15_000_000).unwrap();
        assert_eq!(amount.to_wire(), "150000.00");
        assert_eq!(Money::from_minor(5).unwrap().to_wire(), "0.05");
    }

    #[test]
    fn test_negative_amount_fails() {
        assert!(matches!(
            Money::from_minor(-1),
            Err(DomainError::NegativeAmount)
        ));
    }

    #[test]
    fn test_parse_wire_variants() {
        assert_eq!(Money::parse_wire("150000.00").unwrap().minor(), 15_000_000);
        assert_eq!(Money::parse_wire("1500").unwrap().minor(), 150_000);
        assert_eq!(Money::parse_wire("1500.5").unwrap().minor(), 150_050);
    }

    #[test]
    fn test_parse_wire_rejects_garbage() {
        assert!(Money::parse_wire("").is_err());
        assert!(Money::parse_wire("12.345").is_err());
        assert!(Money::parse_wire("abc").is_err());
        assert!(Money::parse_wire("-3.00").is_err());
    }

    #[test]
    fn test_wire_round_trip() {
        let amount = Money::from_major(150_000).unwrap();
        assert_eq!(Money::parse_wire(&amount.to_wire()).unwrap(), amount);
    }

    #[test]
    fn test_display_includes_currency() {
        let amount = Money::from_major(10).unwrap();
        assert_eq!(amount.to_string(), "10.00 PYG");
    }
}
