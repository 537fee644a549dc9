//! Persistence seam.
//!
//! [`Repository`] serves read-only queries and opens units of work. Every
//! stock-affecting operation runs inside one [`UnitOfWork`]; dropping a unit of
//! work without calling [`UnitOfWork::commit`] rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{
    Book, Cart, CartOwner, Customer, CustomerId, CustomerLookup, NewOrder, Order, PendingCart,
};
use crate::domain::value_objects::{Isbn, Money};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Data corruption: {0}")]
    DataCorruption(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// One page of a listing. Pages are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE) }
    }

    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

/// Half-open time range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SalesWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SalesWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool { at >= self.start && at < self.end }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookSales {
    pub isbn: Isbn,
    pub title: String,
    pub quantity: u64,
    pub revenue: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesTotals {
    pub revenue: Money,
    pub quantity: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerSpend {
    pub customer_id: CustomerId,
    pub name: String,
    pub username: String,
    pub total_spent: Money,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCustomer {
    pub username: String,
    pub name: String,
    pub phone: String,
    pub vip: bool,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>>;

    async fn list_books(&self, page: Page) -> RepoResult<Vec<Book>>;
    async fn find_book(&self, isbn: &Isbn) -> RepoResult<Option<Book>>;
    async fn count_books(&self) -> RepoResult<u64>;

    async fn find_customer(&self, id: CustomerId) -> RepoResult<CustomerLookup>;

    /// Newest first.
    async fn list_orders(&self, customer: Option<CustomerId>, page: Page) -> RepoResult<Vec<Order>>;
    async fn find_order(&self, id: i64) -> RepoResult<Option<Order>>;
    async fn count_orders(&self) -> RepoResult<u64>;

    /// Paid sales in the window grouped by book, highest quantity first, ties by title.
    async fn top_selling_books(&self, window: &SalesWindow, limit: u32) -> RepoResult<Vec<BookSales>>;
    async fn sales_totals(&self, window: &SalesWindow) -> RepoResult<SalesTotals>;
    /// Registered customers ranked by lifetime paid spend.
    async fn top_customers(&self, limit: u32) -> RepoResult<Vec<CustomerSpend>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Reads a book and holds it against concurrent stock changes until commit.
    async fn lock_book(&mut self, isbn: &Isbn) -> RepoResult<Option<Book>>;
    /// Inserts or replaces a book by ISBN.
    async fn save_book(&mut self, book: &Book) -> RepoResult<()>;

    async fn customer(&mut self, id: CustomerId) -> RepoResult<CustomerLookup>;
    async fn insert_customer(&mut self, customer: &NewCustomer) -> RepoResult<Customer>;
    async fn save_customer(&mut self, customer: &Customer) -> RepoResult<()>;

    /// Empty when the session holds nothing.
    async fn pending_cart(&mut self, session_key: &str) -> RepoResult<PendingCart>;
    async fn save_pending_cart(&mut self, cart: &PendingCart) -> RepoResult<()>;
    /// Pending carts holding at least one line that expired at or before `now`.
    async fn expired_pending_carts(&mut self, now: DateTime<Utc>) -> RepoResult<Vec<PendingCart>>;

    async fn cart(&mut self, owner: &CartOwner) -> RepoResult<Option<Cart>>;
    /// Persists the cart and its lines, assigning an id to a new cart.
    async fn save_cart(&mut self, cart: &mut Cart) -> RepoResult<()>;
    async fn delete_cart(&mut self, cart_id: i64) -> RepoResult<()>;
    /// Anonymous carts last changed at or before `updated_before`.
    async fn stale_session_carts(&mut self, updated_before: DateTime<Utc>) -> RepoResult<Vec<Cart>>;

    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order>;
    async fn lock_order(&mut self, id: i64) -> RepoResult<Option<Order>>;
    async fn save_order_status(&mut self, order: &Order) -> RepoResult<()>;

    async fn commit(self: Box<Self>) -> RepoResult<()>;
}
