//! In-memory repository.
//!
//! Units of work hold an owned lock on the whole state and operate on a copy,
//! so they are serialised and either commit everything or nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    BookSales, CustomerSpend, NewCustomer, Page, RepoResult, Repository, RepositoryError, SalesTotals,
    SalesWindow, UnitOfWork,
};
use crate::domain::aggregates::{
    Book, Cart, CartOwner, Customer, CustomerId, CustomerLookup, NewOrder, Order, OrderStatus, PendingCart,
};
use crate::domain::value_objects::{Isbn, Money};

#[derive(Clone, Default)]
struct MemoryState {
    books: BTreeMap<Isbn, Book>,
    customers: BTreeMap<CustomerId, Customer>,
    pending: HashMap<String, PendingCart>,
    carts: BTreeMap<i64, Cart>,
    orders: BTreeMap<i64, Order>,
    last_customer_id: i64,
    last_cart_id: i64,
    last_order_id: i64,
}

impl MemoryState {
    fn paid_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.status() == OrderStatus::Paid)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a book outright, leaving any cart lines that reference it dangling.
    pub async fn remove_book(&self, isbn: &Isbn) -> bool {
        self.state.lock().await.books.remove(isbn).is_some()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn list_books(&self, page: Page) -> RepoResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut books: Vec<&Book> = state.books.values().collect();
        books.sort_by(|a, b| a.title().cmp(b.title()).then_with(|| a.isbn().cmp(b.isbn())));
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(books.into_iter().skip(skip).take(page.per_page as usize).cloned().collect())
    }

    async fn find_book(&self, isbn: &Isbn) -> RepoResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(isbn).cloned())
    }

    async fn count_books(&self) -> RepoResult<u64> {
        Ok(self.state.lock().await.books.len() as u64)
    }

    async fn find_customer(&self, id: CustomerId) -> RepoResult<CustomerLookup> {
        Ok(self.state.lock().await.customers.get(&id).cloned().into())
    }

    async fn list_orders(&self, customer: Option<CustomerId>, page: Page) -> RepoResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values()
            .filter(|o| customer.is_none() || o.party().customer_id() == customer)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date().cmp(&a.order_date()).then(b.id().cmp(&a.id())));
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(skip).take(page.per_page as usize).collect())
    }

    async fn find_order(&self, id: i64) -> RepoResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn count_orders(&self) -> RepoResult<u64> {
        Ok(self.state.lock().await.orders.len() as u64)
    }

    async fn top_selling_books(&self, window: &SalesWindow, limit: u32) -> RepoResult<Vec<BookSales>> {
        let state = self.state.lock().await;
        let mut by_book: BTreeMap<Isbn, BookSales> = BTreeMap::new();
        for item in state.paid_orders().filter(|o| window.contains(o.order_date())).flat_map(Order::items) {
            let entry = by_book.entry(item.isbn.clone()).or_insert_with(|| BookSales {
                isbn: item.isbn.clone(), title: item.title.clone(), quantity: 0, revenue: Money::ZERO,
            });
            entry.quantity += u64::from(item.quantity);
            entry.revenue = entry.revenue + item.subtotal();
        }
        let mut ranked: Vec<BookSales> = by_book.into_values().collect();
        ranked.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.title.cmp(&b.title)));
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn sales_totals(&self, window: &SalesWindow) -> RepoResult<SalesTotals> {
        let state = self.state.lock().await;
        Ok(state.paid_orders()
            .filter(|o| window.contains(o.order_date()))
            .flat_map(Order::items)
            .fold(SalesTotals::default(), |acc, item| SalesTotals {
                revenue: acc.revenue + item.subtotal(),
                quantity: acc.quantity + u64::from(item.quantity),
            }))
    }

    async fn top_customers(&self, limit: u32) -> RepoResult<Vec<CustomerSpend>> {
        let state = self.state.lock().await;
        let mut spend: BTreeMap<CustomerId, Money> = BTreeMap::new();
        for order in state.paid_orders() {
            if let Some(id) = order.party().customer_id() {
                let total = spend.entry(id).or_default();
                *total = *total + order.final_total();
            }
        }
        let mut ranked: Vec<CustomerSpend> = spend.into_iter()
            .filter_map(|(id, total_spent)| state.customers.get(&id).map(|c| CustomerSpend {
                customer_id: id, name: c.name.clone(), username: c.username.clone(), total_spent,
            }))
            .collect();
        ranked.sort_by(|a, b| b.total_spent.cmp(&a.total_spent).then(a.customer_id.cmp(&b.customer_id)));
        ranked.truncate(limit as usize);
        Ok(ranked)
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_book(&mut self, isbn: &Isbn) -> RepoResult<Option<Book>> {
        Ok(self.working.books.get(isbn).cloned())
    }

    async fn save_book(&mut self, book: &Book) -> RepoResult<()> {
        let mut stored = book.clone();
        stored.take_events();
        self.working.books.insert(stored.isbn().clone(), stored);
        Ok(())
    }

    async fn customer(&mut self, id: CustomerId) -> RepoResult<CustomerLookup> {
        Ok(self.working.customers.get(&id).cloned().into())
    }

    async fn insert_customer(&mut self, customer: &NewCustomer) -> RepoResult<Customer> {
        if self.working.customers.values().any(|c| c.username == customer.username) {
            return Err(RepositoryError::Conflict(format!("username {} already taken", customer.username)));
        }
        self.working.last_customer_id += 1;
        let created = Customer {
            id: CustomerId(self.working.last_customer_id),
            username: customer.username.clone(),
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            vip: customer.vip,
        };
        self.working.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save_customer(&mut self, customer: &Customer) -> RepoResult<()> {
        self.working.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn pending_cart(&mut self, session_key: &str) -> RepoResult<PendingCart> {
        Ok(self.working.pending.get(session_key).cloned().unwrap_or_else(|| PendingCart::new(session_key)))
    }

    async fn save_pending_cart(&mut self, cart: &PendingCart) -> RepoResult<()> {
        if cart.is_empty() {
            self.working.pending.remove(cart.session_key());
        } else {
            self.working.pending.insert(cart.session_key().to_string(), cart.clone());
        }
        Ok(())
    }

    async fn expired_pending_carts(&mut self, now: DateTime<Utc>) -> RepoResult<Vec<PendingCart>> {
        Ok(self.working.pending.values()
            .filter(|c| c.lines().any(|(_, l)| l.expires_at <= now))
            .cloned()
            .collect())
    }

    async fn cart(&mut self, owner: &CartOwner) -> RepoResult<Option<Cart>> {
        Ok(self.working.carts.values().find(|c| c.owner() == owner).cloned())
    }

    async fn save_cart(&mut self, cart: &mut Cart) -> RepoResult<()> {
        let id = match cart.id() {
            Some(id) => id,
            None => {
                self.working.last_cart_id += 1;
                cart.assign_id(self.working.last_cart_id);
                self.working.last_cart_id
            }
        };
        self.working.carts.insert(id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: i64) -> RepoResult<()> {
        self.working.carts.remove(&cart_id);
        Ok(())
    }

    async fn stale_session_carts(&mut self, updated_before: DateTime<Utc>) -> RepoResult<Vec<Cart>> {
        Ok(self.working.carts.values()
            .filter(|c| matches!(c.owner(), CartOwner::Session(_)) && c.updated_at() <= updated_before)
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order> {
        self.working.last_order_id += 1;
        let placed = Order::place(self.working.last_order_id, order);
        let mut stored = placed.clone();
        stored.take_events();
        self.working.orders.insert(placed.id(), stored);
        Ok(placed)
    }

    async fn lock_order(&mut self, id: i64) -> RepoResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn save_order_status(&mut self, order: &Order) -> RepoResult<()> {
        let mut stored = order.clone();
        stored.take_events();
        self.working.orders.insert(order.id(), stored);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
