use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use super::cart::{reconcile, OpenCart};
use super::{insufficient_stock, Bookstore, CartIdentity};
use crate::config::StockPolicy;
use crate::domain::aggregates::{CustomerLookup, NewOrder, Order, OrderItem, OrderParty, OrderStatus};
use crate::Result;

/// Contact details collected at checkout.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CheckoutForm {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "phone is required"))]
    pub phone: String,
    /// Orders are created unpaid unless the caller says otherwise.
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

impl CheckoutForm {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self { name: name.into(), phone: phone.into(), status: None }
    }

    pub fn paid(mut self) -> Self {
        self.status = Some(OrderStatus::Paid);
        self
    }

    fn trimmed(self) -> Self {
        Self { name: self.name.trim().to_string(), phone: self.phone.trim().to_string(), status: self.status }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Placed { order: Order, notices: Vec<String> },
    /// Nothing to buy; no order was created.
    EmptyCart { notices: Vec<String> },
}

impl Bookstore {
    /// Turns the identity's cart into an order in one unit of work.
    ///
    /// Prices are frozen from the cart lines at the shopper's tier. Under
    /// [`StockPolicy::DeductOnCheckout`] every line's stock is taken here and
    /// the first short line aborts the whole checkout.
    #[instrument(skip(self, form), fields(session = %identity.session_key))]
    pub async fn checkout(&self, identity: &CartIdentity, form: CheckoutForm) -> Result<CheckoutOutcome> {
        let form = form.trimmed();
        form.validate()?;

        let mut uow = self.repo.begin().await?;
        let OpenCart { mut cart, shopper, notices } = reconcile(uow.as_mut(), identity).await?;

        let tier = shopper.tier();
        let items: Vec<OrderItem> = cart.items().iter().map(|i| OrderItem::from_cart_item(i, tier)).collect();
        let party = match shopper {
            CustomerLookup::Found(customer) => OrderParty::registered(&customer),
            CustomerLookup::NotFound => OrderParty::Guest { name: form.name.clone(), phone: form.phone.clone() },
        };
        let Ok(new_order) = NewOrder::new(party, form.status.unwrap_or_default(), items, Utc::now()) else {
            uow.commit().await?;
            info!("checkout on empty cart");
            return Ok(CheckoutOutcome::EmptyCart { notices });
        };

        let mut events = Vec::new();
        if self.settings.stock_policy == StockPolicy::DeductOnCheckout {
            for line in &new_order.items {
                let Some(mut book) = uow.lock_book(&line.isbn).await? else { continue };
                book.reserve(line.quantity).map_err(|e| insufficient_stock(&book, e))?;
                uow.save_book(&book).await?;
                events.extend(book.take_events());
            }
        }

        let mut order = uow.insert_order(new_order).await?;
        cart.clear();
        uow.save_cart(&mut cart).await?;
        uow.commit().await?;

        info!(order_id = order.id(), total = %order.final_total(), "order placed");
        events.extend(order.take_events());
        self.publish(events).await;
        Ok(CheckoutOutcome::Placed { order, notices })
    }
}
