//! PostgreSQL repository.
//!
//! Schema lives in `migrations/`. Rows touched by stock or status changes are
//! read with `FOR UPDATE` inside the unit of work's transaction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Transaction};

use super::{
    BookSales, CustomerSpend, NewCustomer, Page, RepoResult, Repository, RepositoryError, SalesTotals,
    SalesWindow, UnitOfWork,
};
use crate::domain::aggregates::{
    Book, Cart, CartItem, CartOwner, Customer, CustomerId, CustomerLookup, NewOrder, Order, OrderItem,
    OrderParty, OrderStatus, PendingCart, PendingLine,
};
use crate::domain::value_objects::{Isbn, Money};

const ORDER_SELECT: &str = "SELECT o.id, o.customer_id, c.name AS customer_name, o.guest_name, o.guest_phone, \
     o.order_date, o.original_total_amount, o.final_total_amount, o.vip_discount_applied, o.status \
     FROM orders o LEFT JOIN customers c ON c.id = o.customer_id";

const BOOK_SELECT: &str = "SELECT isbn, title, author, press, price, stock, summary FROM books";

const CART_SELECT: &str = "SELECT id, customer_id, session_key, created_at, updated_at FROM carts";

/// Lines carry their own title so they outlive the book they point at.
const CART_ITEM_SELECT: &str = "SELECT isbn, title, quantity, price_at_addition, original_price, added_at \
     FROM cart_items WHERE cart_id = $1 ORDER BY added_at, id";

/// Create a connection pool and bring the schema up to date.
pub async fn connect(database_url: &str, max_connections: u32) -> RepoResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn corrupt(what: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(what.to_string())
}

fn to_i32(value: u32, field: &str) -> RepoResult<i32> {
    i32::try_from(value).map_err(|_| corrupt(format!("{field} {value} out of range")))
}

fn to_u32(value: i32, field: &str) -> RepoResult<u32> {
    u32::try_from(value).map_err(|_| corrupt(format!("negative {field}: {value}")))
}

fn to_isbn(value: String) -> RepoResult<Isbn> {
    Isbn::new(value.clone()).map_err(|e| corrupt(format!("invalid isbn {value:?} in database: {e}")))
}

#[derive(sqlx::FromRow)]
struct BookRow {
    isbn: String,
    title: String,
    author: Option<String>,
    press: Option<String>,
    price: Decimal,
    stock: i32,
    summary: Option<String>,
}

impl TryFrom<BookRow> for Book {
    type Error = RepositoryError;

    fn try_from(r: BookRow) -> RepoResult<Self> {
        Ok(Book::new(to_isbn(r.isbn)?, r.title, Money::new(r.price), to_u32(r.stock, "stock")?)
            .with_author(r.author)
            .with_press(r.press)
            .with_summary(r.summary))
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    username: String,
    name: String,
    phone: String,
    vip_status: bool,
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Customer { id: CustomerId(r.id), username: r.username, name: r.name, phone: r.phone, vip: r.vip_status }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: i64,
    customer_id: Option<i64>,
    session_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    isbn: String,
    title: String,
    quantity: i32,
    price_at_addition: Decimal,
    original_price: Option<Decimal>,
    added_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(r: CartItemRow) -> RepoResult<Self> {
        let mut item = CartItem::new(to_isbn(r.isbn)?, r.title, to_u32(r.quantity, "quantity")?, Money::new(r.price_at_addition), r.added_at);
        item.original_price = r.original_price.map(Money::new);
        Ok(item)
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    isbn: String,
    quantity: i32,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_id: Option<i64>,
    customer_name: Option<String>,
    guest_name: Option<String>,
    guest_phone: Option<String>,
    order_date: DateTime<Utc>,
    original_total_amount: Option<Decimal>,
    final_total_amount: Decimal,
    vip_discount_applied: bool,
    status: String,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: i64,
    isbn: String,
    title: String,
    count: i32,
    price: Decimal,
    original_unit_price: Option<Decimal>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(r: OrderItemRow) -> RepoResult<Self> {
        Ok(OrderItem {
            isbn: to_isbn(r.isbn)?,
            title: r.title,
            quantity: to_u32(r.count, "count")?,
            unit_price: Money::new(r.price),
            original_unit_price: Money::new(r.original_unit_price.unwrap_or(r.price)),
        })
    }
}

fn order_from_row(r: OrderRow, items: Vec<OrderItem>) -> RepoResult<Order> {
    let party = match r.customer_id {
        Some(id) => OrderParty::Registered { customer_id: CustomerId(id), name: r.customer_name.unwrap_or_default() },
        None => OrderParty::Guest { name: r.guest_name.unwrap_or_default(), phone: r.guest_phone.unwrap_or_default() },
    };
    let status = OrderStatus::from_code(&r.status).ok_or_else(|| corrupt(format!("unknown order status {:?}", r.status)))?;
    let final_total = Money::new(r.final_total_amount);
    Ok(Order::restore(r.id, NewOrder {
        party,
        status,
        items,
        original_total: r.original_total_amount.map_or(final_total, Money::new),
        final_total,
        vip_discount_applied: r.vip_discount_applied,
        order_date: r.order_date,
    }))
}

/// Loads the items of every order in `rows` and assembles the aggregates, keeping row order.
async fn assemble_orders(conn: &mut PgConnection, rows: Vec<OrderRow>) -> RepoResult<Vec<Order>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let item_rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT order_id, isbn, title, count, price, original_unit_price FROM order_items WHERE order_id = ANY($1) ORDER BY id",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
        let order_id = row.order_id;
        items.entry(order_id).or_default().push(OrderItem::try_from(row)?);
    }
    rows.into_iter()
        .map(|r| {
            let lines = items.remove(&r.id).unwrap_or_default();
            order_from_row(r, lines)
        })
        .collect()
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn list_books(&self, page: Page) -> RepoResult<Vec<Book>> {
        let sql = format!("{BOOK_SELECT} ORDER BY title, isbn LIMIT $1 OFFSET $2");
        sqlx::query_as::<_, BookRow>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Book::try_from)
            .collect()
    }

    async fn find_book(&self, isbn: &Isbn) -> RepoResult<Option<Book>> {
        let sql = format!("{BOOK_SELECT} WHERE isbn = $1");
        sqlx::query_as::<_, BookRow>(&sql)
            .bind(isbn.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Book::try_from)
            .transpose()
    }

    async fn count_books(&self) -> RepoResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&self.pool).await?;
        Ok(n.unsigned_abs())
    }

    async fn find_customer(&self, id: CustomerId) -> RepoResult<CustomerLookup> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT id, username, name, phone, vip_status FROM customers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from).into())
    }

    async fn list_orders(&self, customer: Option<CustomerId>, page: Page) -> RepoResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "{ORDER_SELECT} WHERE ($1::BIGINT IS NULL OR o.customer_id = $1) ORDER BY o.order_date DESC, o.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(customer.map(|c| c.0))
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await?;
        assemble_orders(&mut conn, rows).await
    }

    async fn find_order(&self, id: i64) -> RepoResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{ORDER_SELECT} WHERE o.id = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        Ok(assemble_orders(&mut conn, vec![row]).await?.pop())
    }

    async fn count_orders(&self) -> RepoResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(&self.pool).await?;
        Ok(n.unsigned_abs())
    }

    async fn top_selling_books(&self, window: &SalesWindow, limit: u32) -> RepoResult<Vec<BookSales>> {
        let rows: Vec<(String, String, i64, Decimal)> = sqlx::query_as(
            r#"
            SELECT oi.isbn, MAX(oi.title) AS title, SUM(oi.count)::BIGINT AS quantity,
                   COALESCE(SUM(oi.count * oi.price), 0) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status = 'P' AND o.order_date >= $1 AND o.order_date < $2
            GROUP BY oi.isbn
            ORDER BY quantity DESC, title ASC
            LIMIT $3
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(isbn, title, quantity, revenue)| {
                Ok(BookSales { isbn: to_isbn(isbn)?, title, quantity: quantity.unsigned_abs(), revenue: Money::new(revenue) })
            })
            .collect()
    }

    async fn sales_totals(&self, window: &SalesWindow) -> RepoResult<SalesTotals> {
        let (revenue, quantity): (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(oi.count * oi.price), 0) AS revenue,
                   COALESCE(SUM(oi.count), 0)::BIGINT AS quantity
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status = 'P' AND o.order_date >= $1 AND o.order_date < $2
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(SalesTotals { revenue: Money::new(revenue), quantity: quantity.unsigned_abs() })
    }

    async fn top_customers(&self, limit: u32) -> RepoResult<Vec<CustomerSpend>> {
        let rows: Vec<(i64, String, String, Decimal)> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.username, SUM(o.final_total_amount) AS total_spent
            FROM orders o
            JOIN customers c ON c.id = o.customer_id
            WHERE o.status = 'P'
            GROUP BY c.id, c.name, c.username
            ORDER BY total_spent DESC, c.id
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter()
            .map(|(id, name, username, total)| CustomerSpend {
                customer_id: CustomerId(id), name, username, total_spent: Money::new(total),
            })
            .collect())
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn cart_items(&mut self, cart_id: i64) -> RepoResult<Vec<CartItem>> {
        sqlx::query_as::<_, CartItemRow>(CART_ITEM_SELECT)
            .bind(cart_id)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(CartItem::try_from)
            .collect()
    }

    async fn cart_from_row(&mut self, row: CartRow) -> RepoResult<Cart> {
        let owner = match (row.customer_id, row.session_key) {
            (Some(id), _) => CartOwner::Customer(CustomerId(id)),
            (None, Some(key)) => CartOwner::Session(key),
            (None, None) => return Err(corrupt(format!("cart {} has no owner", row.id))),
        };
        let items = self.cart_items(row.id).await?;
        Ok(Cart::restore(row.id, owner, items, row.created_at, row.updated_at))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_book(&mut self, isbn: &Isbn) -> RepoResult<Option<Book>> {
        let sql = format!("{BOOK_SELECT} WHERE isbn = $1 FOR UPDATE");
        sqlx::query_as::<_, BookRow>(&sql)
            .bind(isbn.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Book::try_from)
            .transpose()
    }

    async fn save_book(&mut self, book: &Book) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (isbn, title, author, press, price, stock, summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (isbn) DO UPDATE SET
                title = EXCLUDED.title, author = EXCLUDED.author, press = EXCLUDED.press,
                price = EXCLUDED.price, stock = EXCLUDED.stock, summary = EXCLUDED.summary
            "#,
        )
        .bind(book.isbn().as_str())
        .bind(book.title())
        .bind(book.author())
        .bind(book.press())
        .bind(book.price().amount())
        .bind(to_i32(book.stock().value(), "stock")?)
        .bind(book.summary())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn customer(&mut self, id: CustomerId) -> RepoResult<CustomerLookup> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT id, username, name, phone, vip_status FROM customers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Customer::from).into())
    }

    async fn insert_customer(&mut self, customer: &NewCustomer) -> RepoResult<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "INSERT INTO customers (username, name, phone, vip_status) VALUES ($1, $2, $3, $4) \
             RETURNING id, username, name, phone, vip_status",
        )
        .bind(&customer.username)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.vip)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("username {} already taken", customer.username))
            }
            other => RepositoryError::Database(other),
        })?;
        Ok(row.into())
    }

    async fn save_customer(&mut self, customer: &Customer) -> RepoResult<()> {
        sqlx::query("UPDATE customers SET name = $2, phone = $3, vip_status = $4 WHERE id = $1")
            .bind(customer.id.0)
            .bind(&customer.name)
            .bind(&customer.phone)
            .bind(customer.vip)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn pending_cart(&mut self, session_key: &str) -> RepoResult<PendingCart> {
        let rows = sqlx::query_as::<_, PendingRow>(
            "SELECT isbn, quantity, expires_at FROM pending_cart_lines WHERE session_key = $1 FOR UPDATE",
        )
        .bind(session_key)
        .fetch_all(&mut *self.tx)
        .await?;
        let lines = rows.into_iter()
            .map(|r| Ok((to_isbn(r.isbn)?, PendingLine { quantity: to_u32(r.quantity, "quantity")?, expires_at: r.expires_at })))
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(PendingCart::restore(session_key, lines))
    }

    async fn save_pending_cart(&mut self, cart: &PendingCart) -> RepoResult<()> {
        sqlx::query("DELETE FROM pending_cart_lines WHERE session_key = $1")
            .bind(cart.session_key())
            .execute(&mut *self.tx)
            .await?;
        for (isbn, line) in cart.lines() {
            sqlx::query("INSERT INTO pending_cart_lines (session_key, isbn, quantity, expires_at) VALUES ($1, $2, $3, $4)")
                .bind(cart.session_key())
                .bind(isbn.as_str())
                .bind(to_i32(line.quantity, "quantity")?)
                .bind(line.expires_at)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn expired_pending_carts(&mut self, now: DateTime<Utc>) -> RepoResult<Vec<PendingCart>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT session_key FROM pending_cart_lines WHERE expires_at <= $1 ORDER BY session_key",
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        let mut carts = Vec::with_capacity(keys.len());
        for key in keys {
            carts.push(self.pending_cart(&key).await?);
        }
        Ok(carts)
    }

    async fn cart(&mut self, owner: &CartOwner) -> RepoResult<Option<Cart>> {
        let row = match owner {
            CartOwner::Customer(id) => {
                let sql = format!("{CART_SELECT} WHERE customer_id = $1 ORDER BY created_at DESC LIMIT 1 FOR UPDATE");
                sqlx::query_as::<_, CartRow>(&sql).bind(id.0).fetch_optional(&mut *self.tx).await?
            }
            CartOwner::Session(key) => {
                let sql = format!(
                    "{CART_SELECT} WHERE session_key = $1 AND customer_id IS NULL ORDER BY created_at DESC LIMIT 1 FOR UPDATE"
                );
                sqlx::query_as::<_, CartRow>(&sql).bind(key).fetch_optional(&mut *self.tx).await?
            }
        };
        match row {
            Some(row) => Ok(Some(self.cart_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn stale_session_carts(&mut self, updated_before: DateTime<Utc>) -> RepoResult<Vec<Cart>> {
        let sql = format!("{CART_SELECT} WHERE customer_id IS NULL AND updated_at <= $1 ORDER BY id FOR UPDATE");
        let rows = sqlx::query_as::<_, CartRow>(&sql).bind(updated_before).fetch_all(&mut *self.tx).await?;
        let mut carts = Vec::with_capacity(rows.len());
        for row in rows {
            carts.push(self.cart_from_row(row).await?);
        }
        Ok(carts)
    }

    async fn save_cart(&mut self, cart: &mut Cart) -> RepoResult<()> {
        let (customer_id, session_key) = match cart.owner() {
            CartOwner::Customer(id) => (Some(id.0), None),
            CartOwner::Session(key) => (None, Some(key.clone())),
        };
        let id = match cart.id() {
            Some(id) => {
                sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
                    .bind(id)
                    .bind(cart.updated_at())
                    .execute(&mut *self.tx)
                    .await?;
                id
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO carts (customer_id, session_key, created_at, updated_at) VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(customer_id)
                .bind(session_key)
                .bind(cart.created_at())
                .bind(cart.updated_at())
                .fetch_one(&mut *self.tx)
                .await?;
                cart.assign_id(id);
                id
            }
        };

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(id).execute(&mut *self.tx).await?;
        for item in cart.items() {
            sqlx::query(
                "INSERT INTO cart_items (cart_id, isbn, title, quantity, price_at_addition, original_price, added_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(id)
            .bind(item.isbn.as_str())
            .bind(&item.title)
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.price_at_addition.amount())
            .bind(item.original_price.map(|p| p.amount()))
            .bind(item.added_at)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: i64) -> RepoResult<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> RepoResult<Order> {
        let (customer_id, guest_name, guest_phone) = match &order.party {
            OrderParty::Registered { customer_id, .. } => (Some(customer_id.0), None, None),
            OrderParty::Guest { name, phone } => (None, Some(name.clone()), Some(phone.clone())),
        };
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (customer_id, guest_name, guest_phone, order_date, original_total_amount,
                                final_total_amount, vip_discount_applied, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(customer_id)
        .bind(guest_name)
        .bind(guest_phone)
        .bind(order.order_date)
        .bind(order.original_total.amount())
        .bind(order.final_total.amount())
        .bind(order.vip_discount_applied)
        .bind(order.status.code())
        .fetch_one(&mut *self.tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, isbn, title, count, price, original_unit_price) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(id)
            .bind(item.isbn.as_str())
            .bind(&item.title)
            .bind(to_i32(item.quantity, "count")?)
            .bind(item.unit_price.amount())
            .bind(item.original_unit_price.amount())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(Order::place(id, order))
    }

    async fn lock_order(&mut self, id: i64) -> RepoResult<Option<Order>> {
        let sql = format!("{ORDER_SELECT} WHERE o.id = $1 FOR UPDATE OF o");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await? else {
            return Ok(None);
        };
        Ok(assemble_orders(&mut *self.tx, vec![row]).await?.pop())
    }

    async fn save_order_status(&mut self, order: &Order) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order.id())
            .bind(order.status().code())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../../migrations/20240101000000_init.sql");

    fn table(name: &str) -> &'static str {
        let start = SCHEMA.find(&format!("CREATE TABLE IF NOT EXISTS {name} (")).unwrap();
        let len = SCHEMA[start..].find(");").unwrap();
        &SCHEMA[start..start + len]
    }

    #[test]
    fn test_cart_lines_survive_book_deletion() {
        for name in ["cart_items", "pending_cart_lines"] {
            assert!(!table(name).contains("REFERENCES books"), "{name} must not cascade from books");
        }
        assert!(table("cart_items").contains("title VARCHAR(100) NOT NULL"));
        assert!(!CART_ITEM_SELECT.contains("JOIN"));
    }

    #[test]
    fn test_titles_capped_at_catalog_limit() {
        let limit = format!("title VARCHAR({}) NOT NULL", Book::MAX_TITLE_CHARS);
        for name in ["books", "cart_items", "order_items"] {
            assert!(table(name).contains(&limit), "{name}");
        }
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_i32(7, "stock").unwrap(), 7);
        assert!(matches!(to_i32(u32::MAX, "stock"), Err(RepositoryError::DataCorruption(_))));
        assert!(matches!(to_u32(-1, "stock"), Err(RepositoryError::DataCorruption(_))));
    }
}
