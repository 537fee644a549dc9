//! Aggregates module
pub mod book;
pub mod customer;
pub mod cart;
pub mod pending;
pub mod order;

pub use book::{Book, BookError};
pub use customer::{Customer, CustomerId, CustomerLookup, PriceTier, VIP_DISCOUNT_RATE};
pub use cart::{Cart, CartError, CartItem, CartOwner, CartTotals};
pub use pending::{PendingCart, PendingLine};
pub use order::{NewOrder, Order, OrderError, OrderItem, OrderParty, OrderStatus};
