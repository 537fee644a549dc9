//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::domain::aggregates::customer::{CustomerId, PriceTier};
use crate::domain::value_objects::{Isbn, Money};

/// Who a persisted cart belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    Customer(CustomerId),
    Session(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartItem {
    pub isbn: Isbn,
    pub title: String,
    pub quantity: u32,
    pub price_at_addition: Money,
    pub original_price: Option<Money>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(isbn: Isbn, title: impl Into<String>, quantity: u32, price: Money, added_at: DateTime<Utc>) -> Self {
        Self { isbn, title: title.into(), quantity, price_at_addition: price, original_price: None, added_at }
    }

    /// Price before any tier discount.
    pub fn list_price(&self) -> Money { self.original_price.unwrap_or(self.price_at_addition) }
    pub fn unit_price(&self, tier: PriceTier) -> Money { tier.unit_price(self.list_price()) }
    pub fn subtotal(&self, tier: PriceTier) -> Money { self.unit_price(tier).multiply(self.quantity) }
    pub fn original_subtotal(&self) -> Money { self.list_price().multiply(self.quantity) }
}

/// Totals of a cart as seen by a given price tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub original_total: Money,
    pub total: Money,
    pub discount: Money,
    pub vip_discount_active: bool,
    pub total_items: u32,
}

#[derive(Clone, Debug)]
pub struct Cart {
    id: Option<i64>,
    owner: CartOwner,
    items: Vec<CartItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self { id: None, owner, items: vec![], created_at: now, updated_at: now }
    }

    pub fn restore(id: i64, owner: CartOwner, items: Vec<CartItem>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id: Some(id), owner, items, created_at, updated_at }
    }

    /// `None` until the cart has been persisted.
    pub fn id(&self) -> Option<i64> { self.id }
    pub fn owner(&self) -> &CartOwner { &self.owner }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item(&self, isbn: &Isbn) -> Option<&CartItem> { self.items.iter().find(|i| &i.isbn == isbn) }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn total_items(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }

    pub fn assign_id(&mut self, id: i64) { self.id = Some(id); }

    /// Increments the existing line for the book, otherwise appends a new line
    /// keeping its price snapshot.
    pub fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.isbn == item.isbn) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.touch();
    }

    /// Sets a line's quantity; zero removes the line. Returns the previous quantity.
    pub fn set_quantity(&mut self, isbn: &Isbn, quantity: u32) -> Result<u32, CartError> {
        let item = self.items.iter_mut().find(|i| &i.isbn == isbn).ok_or(CartError::ItemNotFound)?;
        let previous = item.quantity;
        if quantity == 0 { self.items.retain(|i| &i.isbn != isbn); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(previous)
    }

    pub fn remove_item(&mut self, isbn: &Isbn) -> Result<CartItem, CartError> {
        let pos = self.items.iter().position(|i| &i.isbn == isbn).ok_or(CartError::ItemNotFound)?;
        let removed = self.items.remove(pos);
        self.touch();
        Ok(removed)
    }

    /// Removes every line, handing them back to the caller.
    pub fn clear(&mut self) -> Vec<CartItem> {
        self.touch();
        std::mem::take(&mut self.items)
    }

    /// Folds another cart's lines into this one.
    pub fn absorb(&mut self, other: Cart) {
        for item in other.items { self.add_item(item); }
    }

    /// Drops lines for which `keep` is false and returns them.
    pub fn prune(&mut self, mut keep: impl FnMut(&CartItem) -> bool) -> Vec<CartItem> {
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items).into_iter().partition(|i| keep(i));
        self.items = kept;
        if !dropped.is_empty() { self.touch(); }
        dropped
    }

    pub fn totals(&self, tier: PriceTier) -> CartTotals {
        let original_total: Money = self.items.iter().map(CartItem::original_subtotal).sum();
        let total: Money = self.items.iter().map(|i| i.subtotal(tier)).sum();
        CartTotals {
            original_total,
            total,
            discount: original_total.saturating_sub(total),
            vip_discount_active: tier.is_vip() && !self.items.is_empty() && total < original_total,
            total_items: self.total_items(),
        }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Item not found") }
}
