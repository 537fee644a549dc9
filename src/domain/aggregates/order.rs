//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::customer::{Customer, CustomerId, PriceTier};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Isbn, Money};

/// Registered customer or guest contact details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderParty {
    Registered { customer_id: CustomerId, name: String },
    Guest { name: String, phone: String },
}

impl OrderParty {
    pub fn registered(customer: &Customer) -> Self {
        Self::Registered { customer_id: customer.id, name: customer.name.clone() }
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        match self { Self::Registered { customer_id, .. } => Some(*customer_id), Self::Guest { .. } => None }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Registered { name, .. } | Self::Guest { name, .. } if !name.is_empty() => name.as_str(),
            _ => "Anonymous",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    #[default]
    Unpaid,
}

impl OrderStatus {
    pub fn code(self) -> &'static str { match self { Self::Paid => "P", Self::Unpaid => "U" } }

    pub fn from_code(code: &str) -> Option<Self> {
        match code { "P" => Some(Self::Paid), "U" => Some(Self::Unpaid), _ => None }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::Paid => write!(f, "Paid"), Self::Unpaid => write!(f, "Unpaid") }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub isbn: Isbn,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub original_unit_price: Money,
}

impl OrderItem {
    /// Freezes a cart line at the price the given tier pays for it.
    pub fn from_cart_item(item: &CartItem, tier: PriceTier) -> Self {
        Self {
            isbn: item.isbn.clone(), title: item.title.clone(), quantity: item.quantity,
            unit_price: item.unit_price(tier), original_unit_price: item.list_price(),
        }
    }

    pub fn subtotal(&self) -> Money { self.unit_price.multiply(self.quantity) }
    pub fn original_subtotal(&self) -> Money { self.original_unit_price.multiply(self.quantity) }
}

/// An order that has not been persisted yet.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub party: OrderParty,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub original_total: Money,
    pub final_total: Money,
    pub vip_discount_applied: bool,
    pub order_date: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(party: OrderParty, status: OrderStatus, items: Vec<OrderItem>, order_date: DateTime<Utc>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let original_total: Money = items.iter().map(OrderItem::original_subtotal).sum();
        let final_total: Money = items.iter().map(OrderItem::subtotal).sum();
        Ok(Self {
            party, status, items, original_total, final_total,
            vip_discount_applied: final_total < original_total,
            order_date,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: i64,
    party: OrderParty,
    status: OrderStatus,
    items: Vec<OrderItem>,
    original_total: Money,
    final_total: Money,
    vip_discount_applied: bool,
    order_date: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Assigns the persisted id to a new order and records the placement.
    pub fn place(id: i64, new: NewOrder) -> Self {
        let mut order = Self::restore(id, new);
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: id, final_total: order.final_total, items: order.items.len(),
        }));
        order
    }

    pub fn restore(id: i64, new: NewOrder) -> Self {
        Self {
            id, party: new.party, status: new.status, items: new.items,
            original_total: new.original_total, final_total: new.final_total,
            vip_discount_applied: new.vip_discount_applied, order_date: new.order_date, events: vec![],
        }
    }

    pub fn id(&self) -> i64 { self.id }
    pub fn party(&self) -> &OrderParty { &self.party }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn original_total(&self) -> Money { self.original_total }
    pub fn final_total(&self) -> Money { self.final_total }
    pub fn vip_discount_applied(&self) -> bool { self.vip_discount_applied }
    pub fn order_date(&self) -> DateTime<Utc> { self.order_date }

    pub fn discount_amount(&self) -> Money {
        if self.vip_discount_applied { self.original_total.saturating_sub(self.final_total).to_cents_precision() }
        else { Money::ZERO }
    }

    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Paid { return Err(OrderError::AlreadyPaid); }
        self.status = OrderStatus::Paid;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Order #{} - {} ({})", self.id, self.party.display_name(), self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, AlreadyPaid }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::NoItems => write!(f, "No items"), Self::AlreadyPaid => write!(f, "Order already paid") }
    }
}
