//! Value Objects for the bookstore

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// ISBN value object. Primary key of the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    pub const MAX_LEN: usize = 13;

    pub fn new(value: impl Into<String>) -> Result<Self, IsbnError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(IsbnError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(IsbnError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Isbn {
    type Error = IsbnError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Isbn> for String {
    fn from(isbn: Isbn) -> Self { isbn.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum IsbnError { Empty, TooLong }
impl std::error::Error for IsbnError {}
impl fmt::Display for IsbnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "ISBN empty"), Self::TooLong => write!(f, "ISBN longer than 13 characters") }
    }
}

/// Money value object. The store trades in a single currency, so only the
/// amount is carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn zero() -> Self { Self::ZERO }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Scales by `rate` and rounds to cents, half to even.
    pub fn scale(&self, rate: Decimal) -> Money {
        Money((self.0 * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
    }

    /// Rounds to cents, half to even.
    pub fn to_cents_precision(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
    }

    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 { Money::ZERO } else { Money(self.0 - other.0) }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "¥{:.2}", self.0) }
}

/// Quantity value object. Stock levels and line quantities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }

    /// A quantity a shopper may request: at least one unit.
    pub fn requested(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Quantity must be at least 1") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn() {
        let isbn = Isbn::new(" 9787115428028 ").unwrap();
        assert_eq!(isbn.as_str(), "9787115428028");
        assert_eq!(Isbn::new("   "), Err(IsbnError::Empty));
        assert_eq!(Isbn::new("97871154280281"), Err(IsbnError::TooLong));
    }

    #[test]
    fn test_money_scale_rounds_half_even() {
        assert_eq!(Money::from_cents(1000).scale(Decimal::new(9, 1)), Money::from_cents(900));
        // 0.25 * 0.9 = 0.225 -> 0.22
        assert_eq!(Money::from_cents(25).scale(Decimal::new(9, 1)), Money::from_cents(22));
        // 0.35 * 0.9 = 0.315 -> 0.32
        assert_eq!(Money::from_cents(35).scale(Decimal::new(9, 1)), Money::from_cents(32));
    }

    #[test]
    fn test_money_sum_and_display() {
        let total: Money = [Money::from_cents(1050), Money::from_cents(250)].into_iter().sum();
        assert_eq!(total, Money::from_cents(1300));
        assert_eq!(total.to_string(), "¥13.00");
        assert_eq!(Money::from_cents(100).saturating_sub(Money::from_cents(300)), Money::ZERO);
    }

    #[test]
    fn test_quantity() {
        assert!(Quantity::requested(0).is_err());
        let q = Quantity::new(5);
        assert_eq!(q.subtract(3), Some(Quantity::new(2)));
        assert_eq!(q.subtract(6), None);
    }
}
