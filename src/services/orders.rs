use tracing::{info, instrument};

use super::Bookstore;
use crate::domain::aggregates::{CustomerId, Order, OrderError};
use crate::repository::Page;
use crate::{BookstoreError, Result};

impl Bookstore {
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: i64) -> Result<Order> {
        let mut uow = self.repo.begin().await?;
        let mut order = uow.lock_order(order_id).await?.ok_or(BookstoreError::OrderNotFound(order_id))?;
        order.mark_paid().map_err(|e| match e {
            OrderError::AlreadyPaid => BookstoreError::OrderAlreadyPaid(order_id),
            OrderError::NoItems => BookstoreError::OrderNotFound(order_id),
        })?;
        uow.save_order_status(&order).await?;
        uow.commit().await?;

        info!(order_id, "order paid");
        let events = order.take_events();
        self.publish(events).await;
        Ok(order)
    }

    /// Newest first; restricted to one customer when given.
    pub async fn list_orders(&self, customer: Option<CustomerId>, page: Page) -> Result<Vec<Order>> {
        Ok(self.repo.list_orders(customer, page).await?)
    }

    pub async fn find_order(&self, order_id: i64) -> Result<Order> {
        self.repo.find_order(order_id).await?.ok_or(BookstoreError::OrderNotFound(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::aggregates::OrderStatus;
    use crate::services::testing::{fixture, isbn};
    use crate::services::{CartIdentity, CheckoutForm, CheckoutOutcome};

    #[tokio::test]
    async fn test_mark_paid_once() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 1).await.unwrap();
        let CheckoutOutcome::Placed { order, .. } = f.store.checkout(&me, CheckoutForm::new("Bo", "1")).await.unwrap() else {
            panic!("no order placed");
        };

        let paid = f.store.mark_paid(order.id()).await.unwrap();
        assert_eq!(paid.status(), OrderStatus::Paid);
        assert_eq!(f.store.find_order(order.id()).await.unwrap().status(), OrderStatus::Paid);
        assert!(matches!(f.store.mark_paid(order.id()).await, Err(BookstoreError::OrderAlreadyPaid(_))));
        assert!(f.events.subjects().contains(&"bookstore.orders.paid"));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let f = fixture(Settings::default());
        assert!(matches!(f.store.mark_paid(9).await, Err(BookstoreError::OrderNotFound(9))));
        assert!(matches!(f.store.find_order(9).await, Err(BookstoreError::OrderNotFound(9))));
        assert!(f.store.list_orders(None, Page::default()).await.unwrap().is_empty());
    }
}
