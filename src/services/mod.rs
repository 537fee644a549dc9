//! Store operations.
//!
//! [`Bookstore`] is the entry point for every use case. Each method that
//! changes state runs inside a single unit of work and publishes the events
//! its aggregates raised once the unit of work has committed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::domain::aggregates::{Book, BookError, CartOwner, CustomerId};
use crate::domain::events::DomainEvent;
use crate::publisher::{publish_all, EventPublisher, LogPublisher};
use crate::repository::Repository;
use crate::BookstoreError;

mod accounts;
mod cart;
mod catalog;
mod checkout;
mod inventory;
mod orders;

pub use accounts::RegisterCustomer;
pub use cart::{CartLineView, CartView};
pub use catalog::StoreSummary;
pub use checkout::{CheckoutForm, CheckoutOutcome};
pub use inventory::{ImportError, ImportSummary, RestockSummary};

/// Who is asking for a cart: always a session, sometimes a signed-in customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartIdentity {
    pub session_key: String,
    pub customer: Option<CustomerId>,
}

impl CartIdentity {
    pub fn anonymous(session_key: impl Into<String>) -> Self {
        Self { session_key: session_key.into(), customer: None }
    }

    pub fn customer(session_key: impl Into<String>, customer: CustomerId) -> Self {
        Self { session_key: session_key.into(), customer: Some(customer) }
    }

    /// The persisted cart this identity shops with.
    pub fn owner(&self) -> CartOwner {
        match self.customer {
            Some(id) => CartOwner::Customer(id),
            None => CartOwner::Session(self.session_key.clone()),
        }
    }
}

#[derive(Clone)]
pub struct Bookstore {
    repo: Arc<dyn Repository>,
    events: Arc<dyn EventPublisher>,
    settings: Settings,
}

impl Bookstore {
    pub fn new(repo: Arc<dyn Repository>, events: Arc<dyn EventPublisher>, settings: Settings) -> Self {
        Self { repo, events, settings }
    }

    /// Store that logs its events instead of publishing them.
    pub fn with_log_events(repo: Arc<dyn Repository>, settings: Settings) -> Self {
        Self::new(repo, Arc::new(LogPublisher), settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    async fn publish(&self, events: Vec<DomainEvent>) {
        publish_all(self.events.as_ref(), events).await;
    }
}

fn insufficient_stock(book: &Book, e: BookError) -> BookstoreError {
    match e {
        BookError::InsufficientStock { requested, available } => BookstoreError::InsufficientStock {
            isbn: book.isbn().clone(),
            title: book.title().to_string(),
            requested,
            available,
        },
    }
}
