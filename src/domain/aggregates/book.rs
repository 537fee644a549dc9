//! Book Aggregate

use serde::Serialize;
use crate::domain::value_objects::{Isbn, Money, Quantity};
use crate::domain::events::{BookEvent, DomainEvent};

#[derive(Clone, Debug, Serialize)]
pub struct Book {
    isbn: Isbn,
    title: String,
    author: Option<String>,
    press: Option<String>,
    price: Money,
    stock: Quantity,
    summary: Option<String>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Book {
    pub const MAX_TITLE_CHARS: usize = 100;

    pub fn new(isbn: Isbn, title: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            isbn, title: title.into(), author: None, press: None,
            price, stock: Quantity::new(stock), summary: None, events: vec![],
        }
    }

    pub fn with_author(mut self, author: Option<String>) -> Self { self.author = author; self }
    pub fn with_press(mut self, press: Option<String>) -> Self { self.press = press; self }
    pub fn with_summary(mut self, summary: Option<String>) -> Self { self.summary = summary; self }

    pub fn isbn(&self) -> &Isbn { &self.isbn }
    pub fn title(&self) -> &str { &self.title }
    pub fn author(&self) -> Option<&str> { self.author.as_deref() }
    pub fn press(&self) -> Option<&str> { self.press.as_deref() }
    pub fn summary(&self) -> Option<&str> { self.summary.as_deref() }
    pub fn price(&self) -> Money { self.price }
    pub fn stock(&self) -> Quantity { self.stock }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }

    pub fn update_price(&mut self, new_price: Money) { self.price = new_price; }

    /// Fails unless `qty` units are on the shelf. Leaves stock untouched.
    pub fn ensure_available(&self, qty: u32) -> Result<(), BookError> {
        if qty > self.stock.value() {
            return Err(BookError::InsufficientStock { requested: qty, available: self.stock.value() });
        }
        Ok(())
    }

    /// Checked decrement. Returns the remaining stock.
    pub fn reserve(&mut self, qty: u32) -> Result<Quantity, BookError> {
        self.stock = self.stock.subtract(qty)
            .ok_or(BookError::InsufficientStock { requested: qty, available: self.stock.value() })?;
        self.raise_event(DomainEvent::Book(BookEvent::StockReserved {
            isbn: self.isbn.clone(), quantity: qty, remaining: self.stock.value(),
        }));
        Ok(self.stock)
    }

    pub fn release(&mut self, qty: u32) -> Quantity {
        self.stock = self.stock.add(qty);
        self.raise_event(DomainEvent::Book(BookEvent::StockReleased {
            isbn: self.isbn.clone(), quantity: qty, remaining: self.stock.value(),
        }));
        self.stock
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookError { InsufficientStock { requested: u32, available: u32 } }
impl std::error::Error for BookError {}
impl std::fmt::Display for BookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientStock { requested, available } =>
                write!(f, "Insufficient stock: {available} < {requested}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(stock: u32) -> Book {
        Book::new(Isbn::new("123").unwrap(), "Rust in Action", Money::from_cents(1000), stock)
    }

    #[test]
    fn test_reserve_and_release() {
        let mut b = book(5);
        assert_eq!(b.reserve(3).unwrap().value(), 2);
        assert_eq!(b.reserve(4), Err(BookError::InsufficientStock { requested: 4, available: 2 }));
        assert_eq!(b.stock().value(), 2);
        assert_eq!(b.release(1).value(), 3);
        assert_eq!(b.take_events().len(), 2);
        assert!(b.take_events().is_empty());
    }

    #[test]
    fn test_ensure_available() {
        let b = book(1);
        assert!(b.ensure_available(1).is_ok());
        assert!(b.ensure_available(2).is_err());
        assert_eq!(b.stock().value(), 1);
    }
}
