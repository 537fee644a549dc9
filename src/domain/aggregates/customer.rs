//! Customer Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Money;

/// VIP customers pay 90% of the list price.
pub const VIP_DISCOUNT_RATE: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub i64);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub username: String,
    pub name: String,
    pub phone: String,
    pub vip: bool,
}

impl Customer {
    pub fn tier(&self) -> PriceTier { if self.vip { PriceTier::Vip } else { PriceTier::Regular } }
}

/// Result of a profile lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomerLookup {
    Found(Customer),
    NotFound,
}

impl CustomerLookup {
    pub fn found(self) -> Option<Customer> {
        match self { Self::Found(c) => Some(c), Self::NotFound => None }
    }

    pub fn tier(&self) -> PriceTier {
        match self { Self::Found(c) => c.tier(), Self::NotFound => PriceTier::Regular }
    }
}

impl From<Option<Customer>> for CustomerLookup {
    fn from(value: Option<Customer>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriceTier {
    #[default]
    Regular,
    Vip,
}

impl PriceTier {
    pub fn unit_price(self, list_price: Money) -> Money {
        match self {
            Self::Regular => list_price,
            Self::Vip => list_price.scale(VIP_DISCOUNT_RATE),
        }
    }

    pub fn is_vip(self) -> bool { self == Self::Vip }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vip_unit_price() {
        assert_eq!(PriceTier::Vip.unit_price(Money::from_cents(1000)), Money::from_cents(900));
        assert_eq!(PriceTier::Vip.unit_price(Money::from_cents(3999)), Money::from_cents(3599));
        assert_eq!(PriceTier::Regular.unit_price(Money::from_cents(3999)), Money::from_cents(3999));
    }

    #[test]
    fn test_lookup_tier() {
        let c = Customer { id: CustomerId(1), username: "ann".into(), name: "Ann".into(), phone: "555".into(), vip: true };
        assert_eq!(CustomerLookup::Found(c.clone()).tier(), PriceTier::Vip);
        assert_eq!(CustomerLookup::NotFound.tier(), PriceTier::Regular);
        assert_eq!(CustomerLookup::from(Some(c)).found().map(|c| c.id), Some(CustomerId(1)));
    }
}
