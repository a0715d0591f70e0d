//! Fixed-Point Amount Module
//!
//! Payment amounts are stored as `i64` base units (10^-8) and compared as
//! integers everywhere inside the service. Conversion to the 8-decimal
//! string or to [`Decimal`] happens only at the HTTP and RPC boundaries.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Base units per whole coin (8 fractional digits).
pub const UNITS_PER_COIN: i64 = 100_000_000;

/// Number of fractional digits carried on the wire.
pub const SCALE: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount literal: {0}")]
    Invalid(String),

    #[error("amount has more than {SCALE} fractional digits: {0}")]
    TooPrecise(String),

    #[error("amount is negative: {0}")]
    Negative(String),
}

/// A non-negative monetary amount in 10^-8 base units.
///
/// Inner value is private to force construction through the audited
/// conversion paths.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Construct from raw base units.
    pub fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Raw base units.
    pub fn units(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Convert a boundary [`Decimal`] into base units.
    ///
    /// Returns `None` when the value is negative, carries more than 8
    /// fractional digits, or overflows `i64`. Ledger outputs that fail this
    /// conversion can never match a session amount and are skipped.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() {
            return None;
        }
        let scaled = value.checked_mul(Decimal::from(UNITS_PER_COIN))?;
        if !scaled.fract().is_zero() {
            return None;
        }
        scaled.to_i64().map(Self)
    }

    /// Decimal view for the API boundary.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }
}

impl fmt::Display for Amount {
    /// Exact 8-decimal rendering, e.g. `0.00500001`. This string is the
    /// pending-index key, so the encoding must never vary.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_COIN;
        let frac = self.0 % UNITS_PER_COIN;
        write!(f, "{whole}.{frac:08}")
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AmountError::Invalid(s.to_string());
        if s.starts_with('-') {
            return Err(AmountError::Negative(s.to_string()));
        }
        let (whole_str, frac_str) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(invalid());
        }
        if frac_str.len() > SCALE as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }
        let whole: i64 = if whole_str.is_empty() {
            0
        } else {
            whole_str.parse().map_err(|_| invalid())?
        };
        let frac: i64 = if frac_str.is_empty() {
            0
        } else {
            // Right-pad to 8 digits so "0.005" and "0.00500000" agree.
            let padded = format!("{frac_str:0<8}");
            padded.parse().map_err(|_| invalid())?
        };
        whole
            .checked_mul(UNITS_PER_COIN)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_exact_8dp() {
        assert_eq!(Amount::from_units(500_001).to_string(), "0.00500001");
        assert_eq!(Amount::from_units(0).to_string(), "0.00000000");
        assert_eq!(
            Amount::from_units(12 * UNITS_PER_COIN + 1).to_string(),
            "12.00000001"
        );
    }

    #[test]
    fn test_parse_8dp() {
        assert_eq!("0.00500001".parse::<Amount>(), Ok(Amount::from_units(500_001)));
        assert_eq!("1".parse::<Amount>(), Ok(Amount::from_units(UNITS_PER_COIN)));
        assert_eq!("0.005".parse::<Amount>(), Ok(Amount::from_units(500_000)));
        assert_eq!(".5".parse::<Amount>(), Ok(Amount::from_units(50_000_000)));
    }

    #[test]
    fn test_round_trip_on_generated_amounts() {
        // Every generated amount is price * qty + nonce; the rendered string
        // must survive a parse/format cycle unchanged.
        for nonce in [1i64, 42, 4_999, 123_456] {
            let amount = Amount::from_units(500_000 * 3 + nonce);
            let rendered = amount.to_string();
            let parsed: Amount = rendered.parse().unwrap();
            assert_eq!(parsed, amount);
            assert_eq!(parsed.to_string(), rendered);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Amount>().is_err());
        assert!(".".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
        assert_eq!(
            "-1".parse::<Amount>(),
            Err(AmountError::Negative("-1".to_string()))
        );
        assert_eq!(
            "0.000000001".parse::<Amount>(),
            Err(AmountError::TooPrecise("0.000000001".to_string()))
        );
    }

    #[test]
    fn test_from_decimal() {
        let d = Decimal::from_str("0.00500001").unwrap();
        assert_eq!(Amount::from_decimal(d), Some(Amount::from_units(500_001)));

        // More than 8 fractional digits never maps to a session amount.
        let sub_unit = Decimal::from_str("0.000000001").unwrap();
        assert_eq!(Amount::from_decimal(sub_unit), None);

        let negative = Decimal::from_str("-0.1").unwrap();
        assert_eq!(Amount::from_decimal(negative), None);
    }

    #[test]
    fn test_to_decimal_matches_display() {
        let a = Amount::from_units(10_000_123);
        assert_eq!(a.to_decimal().to_string(), "0.10000123");
    }
}
