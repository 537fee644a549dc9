//! Domain events
use crate::domain::value_objects::{Isbn, Money};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Book(BookEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Book(BookEvent::StockReserved { .. }) => "bookstore.books.stock_reserved",
            Self::Book(BookEvent::StockReleased { .. }) => "bookstore.books.stock_released",
            Self::Book(BookEvent::Imported { .. }) => "bookstore.books.imported",
            Self::Order(OrderEvent::Placed { .. }) => "bookstore.orders.placed",
            Self::Order(OrderEvent::Paid { .. }) => "bookstore.orders.paid",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookEvent {
    StockReserved { isbn: Isbn, quantity: u32, remaining: u32 },
    StockReleased { isbn: Isbn, quantity: u32, remaining: u32 },
    Imported { isbn: Isbn },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: i64, final_total: Money, items: usize },
    Paid { order_id: i64 },
}
