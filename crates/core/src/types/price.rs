//! Type-safe price representation using decimal arithmetic.
//!
//! The storefront backend reports prices as plain numbers in the store's
//! single currency, so `Price` carries an amount only. Decimal arithmetic
//! keeps line totals exact (no float drift when summing a cart).

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency.
///
/// Serializes as a decimal string (`"499.99"`) and deserializes from either a
/// string or a JSON number, so payloads written by older clients still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from a whole number of currency units.
    #[must_use]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::from_units(500).times(2), Price::from_units(25).times(1)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_units(1025));
    }

    #[test]
    fn test_empty_sum_is_zero() {
        let total: Price = std::iter::empty().sum();
        assert_eq!(total, Price::ZERO);
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let from_number: Price = serde_json::from_str("500").unwrap();
        let from_string: Price = serde_json::from_str("\"500\"").unwrap();
        assert_eq!(from_number, Price::from_units(500));
        assert_eq!(from_string, from_number);

        let fractional: Price = serde_json::from_str("\"19.99\"").unwrap();
        assert_eq!(fractional, "19.99".parse::<Price>().unwrap());
    }

    #[test]
    fn test_display_two_places() {
        assert_eq!(Price::from_units(1000).to_string(), "1000.00");
        assert_eq!("4.5".parse::<Price>().unwrap().to_string(), "4.50");
    }

    #[test]
    fn test_is_negative() {
        assert!("-1".parse::<Price>().unwrap().is_negative());
        assert!(!Price::ZERO.is_negative());
        assert!(!Price::from_units(3).is_negative());
    }
}
