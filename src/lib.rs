//! Bookstore Sales
//!
//! Sales management for a small bookstore.
//!
//! ## Features
//! - Book catalog browsing and JSON import
//! - Session and customer carts with stock reservation
//! - Checkout into orders with VIP pricing
//! - Sales reporting over paid orders

pub mod api;
pub mod config;
pub mod domain;
pub mod publisher;
pub mod report;
pub mod repository;
pub mod services;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::aggregates::CustomerId;
use crate::domain::value_objects::{Isbn, IsbnError};
use crate::repository::RepositoryError;

pub use config::{Config, Settings, StockPolicy};
pub use services::Bookstore;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum BookstoreError {
    #[error("Book not found: {0}")]
    BookNotFound(Isbn),

    #[error("Insufficient stock for {title} ({isbn}): {available} < {requested}")]
    InsufficientStock { isbn: Isbn, title: String, requested: u32, available: u32 },

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(#[from] IsbnError),

    #[error("{0} is not in the cart")]
    LineNotInCart(Isbn),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Order {0} is already paid")]
    OrderAlreadyPaid(i64),

    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for BookstoreError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BookstoreError>;

/// Installs the fmt subscriber, filtered by `RUST_LOG` and defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
