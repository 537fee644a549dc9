//! JSON HTTP API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::{Book, Order};
use crate::domain::value_objects::{Isbn, Money};
use crate::repository::Page;
use crate::services::{Bookstore, CartIdentity, CheckoutForm, CheckoutOutcome, RegisterCustomer};
use crate::Result;

mod error;
mod extractor;

pub use extractor::{CurrentCustomer, CUSTOMER_HEADER, SESSION_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub store: Bookstore,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "bookstore-sales"})) }))
        .route("/api/v1/summary", get(summary))
        .route("/api/v1/books", get(list_books))
        .route("/api/v1/books/:isbn", get(get_book))
        .route("/api/v1/cart", get(view_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_item))
        .route("/api/v1/cart/items/:isbn", put(update_item).delete(remove_item))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/pay", post(pay_order))
        .route("/api/v1/customers", post(register_customer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: u64, pub page: u32 }

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub discount_amount: Money,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self { customer_name: order.party().display_name().to_string(), discount_amount: order.discount_amount(), order }
    }
}

async fn summary(State(s): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(s.store.summary().await?))
}

async fn list_books(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Book>>> {
    let page = Page::new(p.page, p.per_page);
    let data = s.store.list_books(page).await?;
    let total = s.store.summary().await?.books;
    Ok(Json(PaginatedResponse { data, total, page: page.page }))
}

async fn get_book(State(s): State<AppState>, Path(isbn): Path<String>) -> Result<Json<Book>> {
    Ok(Json(s.store.find_book(&Isbn::new(isbn)?).await?))
}

async fn view_cart(State(s): State<AppState>, identity: CartIdentity) -> Result<impl IntoResponse> {
    Ok(Json(s.store.view_cart(&identity).await?))
}

#[derive(Debug, Deserialize)] pub struct AddItemRequest { pub isbn: Isbn, pub quantity: u32 }
#[derive(Debug, Deserialize)] pub struct UpdateItemRequest { pub quantity: u32 }

async fn add_item(State(s): State<AppState>, identity: CartIdentity, Json(r): Json<AddItemRequest>) -> Result<impl IntoResponse> {
    let stock = s.store.add_to_cart(&identity, &r.isbn, r.quantity).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "isbn": r.isbn, "quantity": r.quantity, "stock": stock }))))
}

async fn update_item(
    State(s): State<AppState>,
    identity: CartIdentity,
    Path(isbn): Path<String>,
    Json(r): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(s.store.update_quantity(&identity, &Isbn::new(isbn)?, r.quantity).await?))
}

async fn remove_item(State(s): State<AppState>, identity: CartIdentity, Path(isbn): Path<String>) -> Result<impl IntoResponse> {
    Ok(Json(s.store.remove_item(&identity, &Isbn::new(isbn)?).await?))
}

async fn clear_cart(State(s): State<AppState>, identity: CartIdentity) -> Result<impl IntoResponse> {
    Ok(Json(s.store.clear_cart(&identity).await?))
}

async fn checkout(State(s): State<AppState>, identity: CartIdentity, Json(form): Json<CheckoutForm>) -> Result<impl IntoResponse> {
    let response = match s.store.checkout(&identity, form).await? {
        CheckoutOutcome::Placed { order, notices } => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "outcome": "placed", "order": OrderView::from(order), "notices": notices })),
        ),
        CheckoutOutcome::EmptyCart { notices } => {
            (StatusCode::OK, Json(serde_json::json!({ "outcome": "empty_cart", "notices": notices })))
        }
    };
    Ok(response)
}

async fn list_orders(
    State(s): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Query(p): Query<ListParams>,
) -> Result<Json<Vec<OrderView>>> {
    let orders = s.store.list_orders(customer, Page::new(p.page, p.per_page)).await?;
    Ok(Json(orders.into_iter().map(OrderView::from).collect()))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<i64>) -> Result<Json<OrderView>> {
    Ok(Json(s.store.find_order(id).await?.into()))
}

async fn pay_order(State(s): State<AppState>, Path(id): Path<i64>) -> Result<Json<OrderView>> {
    Ok(Json(s.store.mark_paid(id).await?.into()))
}

async fn register_customer(State(s): State<AppState>, Json(r): Json<RegisterCustomer>) -> Result<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(s.store.register_customer(r).await?)))
}
