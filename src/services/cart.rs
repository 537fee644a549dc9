//! Cart use cases and the reconciliation run on every cart access.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{insufficient_stock, Bookstore, CartIdentity};
use crate::config::StockPolicy;
use crate::domain::aggregates::{Cart, CartItem, CartOwner, CartTotals, CustomerLookup, PriceTier};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Isbn, Money, Quantity};
use crate::repository::UnitOfWork;
use crate::{BookstoreError, Result};

/// A cart line as the shopper sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartLineView {
    pub isbn: Isbn,
    pub title: String,
    pub quantity: u32,
    pub list_price: Money,
    pub unit_price: Money,
    pub subtotal: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    #[serde(flatten)]
    pub totals: CartTotals,
    /// Lines dropped because their book left the catalog.
    pub notices: Vec<String>,
}

impl CartView {
    pub(crate) fn new(cart: &Cart, tier: PriceTier, notices: Vec<String>) -> Self {
        let items = cart.items().iter()
            .map(|i| CartLineView {
                isbn: i.isbn.clone(),
                title: i.title.clone(),
                quantity: i.quantity,
                list_price: i.list_price(),
                unit_price: i.unit_price(tier),
                subtotal: i.subtotal(tier),
            })
            .collect();
        Self { items, totals: cart.totals(tier), notices }
    }

    pub fn quantity(&self, isbn: &Isbn) -> u32 {
        self.items.iter().find(|l| &l.isbn == isbn).map_or(0, |l| l.quantity)
    }
}

/// A cart after reconciliation, still held by its unit of work.
pub(crate) struct OpenCart {
    pub cart: Cart,
    pub shopper: CustomerLookup,
    pub notices: Vec<String>,
}

fn unavailable(isbn: &Isbn) -> String {
    format!("Book {isbn} is no longer available and was removed from your cart")
}

/// Loads the identity's cart and brings it up to date: folds in the
/// anonymous cart of a customer who just signed in, merges pending quick
/// adds, and drops lines whose book no longer exists. The result is saved
/// when anything changed.
pub(crate) async fn reconcile(uow: &mut dyn UnitOfWork, identity: &CartIdentity) -> Result<OpenCart> {
    let shopper = match identity.customer {
        Some(id) => match uow.customer(id).await? {
            CustomerLookup::NotFound => return Err(BookstoreError::CustomerNotFound(id)),
            found => found,
        },
        None => CustomerLookup::NotFound,
    };

    let owner = identity.owner();
    let mut cart = uow.cart(&owner).await?.unwrap_or_else(|| Cart::new(owner.clone()));
    let mut notices = Vec::new();
    let mut dirty = false;

    if matches!(owner, CartOwner::Customer(_)) {
        if let Some(anonymous) = uow.cart(&CartOwner::Session(identity.session_key.clone())).await? {
            if let Some(id) = anonymous.id() {
                uow.delete_cart(id).await?;
            }
            info!(session = %identity.session_key, lines = anonymous.items().len(), "merging anonymous cart");
            cart.absorb(anonymous);
            dirty = true;
        }
    }

    let mut pending = uow.pending_cart(&identity.session_key).await?;
    if !pending.is_empty() {
        let now = Utc::now();
        for (isbn, line) in pending.drain() {
            match uow.lock_book(&isbn).await? {
                Some(book) => cart.add_item(CartItem::new(isbn, book.title(), line.quantity, book.price(), now)),
                None => {
                    warn!(%isbn, "pending line for missing book dropped");
                    notices.push(unavailable(&isbn));
                }
            }
        }
        uow.save_pending_cart(&pending).await?;
        dirty = true;
    }

    let mut missing = Vec::new();
    for item in cart.items() {
        if uow.lock_book(&item.isbn).await?.is_none() {
            missing.push(item.isbn.clone());
        }
    }
    if !missing.is_empty() {
        for dropped in cart.prune(|i| !missing.contains(&i.isbn)) {
            warn!(isbn = %dropped.isbn, "cart line for missing book dropped");
            notices.push(unavailable(&dropped.isbn));
        }
        dirty = true;
    }

    if dirty && (cart.id().is_some() || !cart.is_empty()) {
        uow.save_cart(&mut cart).await?;
    }
    Ok(OpenCart { cart, shopper, notices })
}

impl Bookstore {
    /// Adds `quantity` units of a book to the identity's session cart.
    ///
    /// Returns the book's stock level afterwards.
    #[instrument(skip(self), fields(session = %identity.session_key))]
    pub async fn add_to_cart(&self, identity: &CartIdentity, isbn: &Isbn, quantity: u32) -> Result<u32> {
        let qty = Quantity::requested(quantity).map_err(|_| BookstoreError::InvalidQuantity)?;
        let mut uow = self.repo.begin().await?;
        let mut book = uow.lock_book(isbn).await?.ok_or_else(|| BookstoreError::BookNotFound(isbn.clone()))?;
        let mut pending = uow.pending_cart(&identity.session_key).await?;

        let remaining = match self.settings.stock_policy {
            StockPolicy::ReserveOnAdd => {
                let left = book.reserve(qty.value()).map_err(|e| insufficient_stock(&book, e))?;
                uow.save_book(&book).await?;
                left.value()
            }
            StockPolicy::DeductOnCheckout => {
                // a signed-in shopper's anonymous cart is merged on next access
                let mut owners = vec![identity.owner()];
                if identity.customer.is_some() {
                    owners.push(CartOwner::Session(identity.session_key.clone()));
                }
                let mut held = pending.quantity(isbn);
                for owner in &owners {
                    if let Some(line) = uow.cart(owner).await?.as_ref().and_then(|c| c.item(isbn)) {
                        held = held.saturating_add(line.quantity);
                    }
                }
                if let Err(e) = book.ensure_available(held.saturating_add(qty.value())) {
                    return Err(insufficient_stock(&book, e));
                }
                book.stock().value()
            }
        };

        pending.add(isbn.clone(), qty.value(), Utc::now(), self.settings.pending_ttl);
        uow.save_pending_cart(&pending).await?;
        uow.commit().await?;

        info!(%isbn, quantity, remaining, "added to cart");
        self.publish(book.take_events()).await;
        Ok(remaining)
    }

    #[instrument(skip(self), fields(session = %identity.session_key))]
    pub async fn view_cart(&self, identity: &CartIdentity) -> Result<CartView> {
        let mut uow = self.repo.begin().await?;
        let open = reconcile(uow.as_mut(), identity).await?;
        uow.commit().await?;
        Ok(CartView::new(&open.cart, open.shopper.tier(), open.notices))
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self), fields(session = %identity.session_key))]
    pub async fn update_quantity(&self, identity: &CartIdentity, isbn: &Isbn, quantity: u32) -> Result<CartView> {
        let mut uow = self.repo.begin().await?;
        let OpenCart { mut cart, shopper, notices } = reconcile(uow.as_mut(), identity).await?;
        let current = cart.item(isbn).map(|i| i.quantity).ok_or_else(|| BookstoreError::LineNotInCart(isbn.clone()))?;
        let mut book = uow.lock_book(isbn).await?.ok_or_else(|| BookstoreError::BookNotFound(isbn.clone()))?;

        match self.settings.stock_policy {
            StockPolicy::ReserveOnAdd if quantity > current => {
                book.reserve(quantity - current).map_err(|e| insufficient_stock(&book, e))?;
                uow.save_book(&book).await?;
            }
            StockPolicy::ReserveOnAdd if quantity < current => {
                book.release(current - quantity);
                uow.save_book(&book).await?;
            }
            StockPolicy::DeductOnCheckout if quantity > current => {
                book.ensure_available(quantity).map_err(|e| insufficient_stock(&book, e))?;
            }
            _ => {}
        }

        cart.set_quantity(isbn, quantity).map_err(|_| BookstoreError::LineNotInCart(isbn.clone()))?;
        uow.save_cart(&mut cart).await?;
        uow.commit().await?;

        self.publish(book.take_events()).await;
        Ok(CartView::new(&cart, shopper.tier(), notices))
    }

    #[instrument(skip(self), fields(session = %identity.session_key))]
    pub async fn remove_item(&self, identity: &CartIdentity, isbn: &Isbn) -> Result<CartView> {
        let mut uow = self.repo.begin().await?;
        let OpenCart { mut cart, shopper, notices } = reconcile(uow.as_mut(), identity).await?;
        let removed = cart.remove_item(isbn).map_err(|_| BookstoreError::LineNotInCart(isbn.clone()))?;
        let events = self.release_lines(uow.as_mut(), std::slice::from_ref(&removed)).await?;
        uow.save_cart(&mut cart).await?;
        uow.commit().await?;

        self.publish(events).await;
        Ok(CartView::new(&cart, shopper.tier(), notices))
    }

    /// Empties the cart, returning any reserved units to stock.
    #[instrument(skip(self), fields(session = %identity.session_key))]
    pub async fn clear_cart(&self, identity: &CartIdentity) -> Result<CartView> {
        let mut uow = self.repo.begin().await?;
        let OpenCart { mut cart, shopper, notices } = reconcile(uow.as_mut(), identity).await?;
        let removed = cart.clear();
        let events = self.release_lines(uow.as_mut(), &removed).await?;
        if cart.id().is_some() {
            uow.save_cart(&mut cart).await?;
        }
        uow.commit().await?;

        self.publish(events).await;
        Ok(CartView::new(&cart, shopper.tier(), notices))
    }

    async fn release_lines(&self, uow: &mut dyn UnitOfWork, lines: &[CartItem]) -> Result<Vec<DomainEvent>> {
        let mut events = Vec::new();
        if self.settings.stock_policy != StockPolicy::ReserveOnAdd {
            return Ok(events);
        }
        for line in lines {
            if let Some(mut book) = uow.lock_book(&line.isbn).await? {
                book.release(line.quantity);
                uow.save_book(&book).await?;
                events.extend(book.take_events());
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::testing::{fixture, isbn};

    fn deduct() -> Settings {
        Settings { stock_policy: StockPolicy::DeductOnCheckout, ..Settings::default() }
    }

    #[tokio::test]
    async fn test_add_reserves_stock() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");

        assert_eq!(f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap(), 2);
        let err = f.store.add_to_cart(&me, &isbn("123"), 4).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { requested: 4, available: 2, .. }));
        assert_eq!(f.stock("123").await, 2);

        let view = f.store.view_cart(&me).await.unwrap();
        assert_eq!(view.quantity(&isbn("123")), 3);
        assert_eq!(view.totals.total, Money::from_cents(3000));
        assert_eq!(f.events.subjects(), vec!["bookstore.books.stock_reserved"]);
    }

    #[tokio::test]
    async fn test_add_rejects_zero_and_unknown_book() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");

        assert!(matches!(f.store.add_to_cart(&me, &isbn("123"), 0).await, Err(BookstoreError::InvalidQuantity)));
        assert!(matches!(f.store.add_to_cart(&me, &isbn("999"), 1).await, Err(BookstoreError::BookNotFound(_))));
        assert_eq!(f.stock("123").await, 5);
    }

    #[tokio::test]
    async fn test_repeat_adds_accumulate() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        let me = CartIdentity::anonymous("s1");

        f.store.add_to_cart(&me, &isbn("123"), 2).await.unwrap();
        f.store.view_cart(&me).await.unwrap();
        f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap();

        let view = f.store.view_cart(&me).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.quantity(&isbn("123")), 5);
        assert_eq!(f.stock("123").await, 5);
    }

    #[tokio::test]
    async fn test_deduct_on_checkout_only_checks_availability() {
        let f = fixture(deduct());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");

        assert_eq!(f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap(), 5);
        f.store.view_cart(&me).await.unwrap();
        let err = f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { requested: 6, available: 5, .. }));
        assert_eq!(f.stock("123").await, 5);
    }

    #[tokio::test]
    async fn test_deduct_on_checkout_huge_quantity_rejected() {
        let f = fixture(deduct());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap();

        let err = f.store.add_to_cart(&me, &isbn("123"), u32::MAX - 1).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { requested: u32::MAX, available: 5, .. }));
        assert_eq!(f.store.view_cart(&me).await.unwrap().quantity(&isbn("123")), 3);
    }

    #[tokio::test]
    async fn test_reserve_huge_quantity_rejected() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap();

        let err = f.store.add_to_cart(&me, &isbn("123"), u32::MAX).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { available: 2, .. }));
        assert_eq!(f.stock("123").await, 2);
    }

    #[tokio::test]
    async fn test_deduct_on_checkout_counts_anonymous_cart_after_login() {
        let f = fixture(deduct());
        f.book("123", "Rust", 1000, 5).await;
        let ann = f.customer("ann", false).await;
        let guest = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&guest, &isbn("123"), 3).await.unwrap();
        f.store.view_cart(&guest).await.unwrap();

        let signed_in = CartIdentity::customer("s1", ann.id);
        let err = f.store.add_to_cart(&signed_in, &isbn("123"), 3).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { requested: 6, available: 5, .. }));

        f.store.add_to_cart(&signed_in, &isbn("123"), 2).await.unwrap();
        assert_eq!(f.store.view_cart(&signed_in).await.unwrap().quantity(&isbn("123")), 5);
    }

    #[tokio::test]
    async fn test_pending_line_for_missing_book_is_dropped_with_notice() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 2).await.unwrap();

        f.repo.remove_book(&isbn("123")).await;
        let view = f.store.view_cart(&me).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.notices.len(), 1);
        assert!(view.notices[0].contains("123"));
    }

    #[tokio::test]
    async fn test_vip_cart_totals() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 2500, 10).await;
        let vip = f.customer("ann", true).await;
        let me = CartIdentity::customer("s1", vip.id);

        f.store.add_to_cart(&me, &isbn("123"), 4).await.unwrap();
        let view = f.store.view_cart(&me).await.unwrap();
        assert_eq!(view.totals.original_total, Money::from_cents(10000));
        assert_eq!(view.totals.total, Money::from_cents(9000));
        assert_eq!(view.totals.discount, Money::from_cents(1000));
        assert!(view.totals.vip_discount_active);
        assert_eq!(view.items[0].unit_price, Money::from_cents(2250));
    }

    #[tokio::test]
    async fn test_missing_book_is_pruned_with_notice() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 5).await;
        f.book("456", "Go", 800, 5).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 1).await.unwrap();
        f.store.add_to_cart(&me, &isbn("456"), 1).await.unwrap();
        f.store.view_cart(&me).await.unwrap();

        f.repo.remove_book(&isbn("456")).await;
        let view = f.store.view_cart(&me).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.notices.len(), 1);
        assert!(view.notices[0].contains("456"));

        assert!(f.store.view_cart(&me).await.unwrap().notices.is_empty());
    }

    #[tokio::test]
    async fn test_login_merges_anonymous_cart() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        f.book("456", "Go", 800, 10).await;
        let ann = f.customer("ann", false).await;

        f.store.add_to_cart(&CartIdentity::customer("old", ann.id), &isbn("123"), 1).await.unwrap();
        f.store.view_cart(&CartIdentity::customer("old", ann.id)).await.unwrap();

        let guest = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&guest, &isbn("123"), 2).await.unwrap();
        f.store.add_to_cart(&guest, &isbn("456"), 1).await.unwrap();
        f.store.view_cart(&guest).await.unwrap();

        let view = f.store.view_cart(&CartIdentity::customer("s1", ann.id)).await.unwrap();
        assert_eq!(view.quantity(&isbn("123")), 3);
        assert_eq!(view.quantity(&isbn("456")), 1);
        assert!(f.store.view_cart(&guest).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_rejected() {
        let f = fixture(Settings::default());
        let me = CartIdentity::customer("s1", crate::domain::aggregates::CustomerId(42));
        assert!(matches!(f.store.view_cart(&me).await, Err(BookstoreError::CustomerNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_and_remove_release_stock() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 4).await.unwrap();

        let view = f.store.update_quantity(&me, &isbn("123"), 6).await.unwrap();
        assert_eq!(view.quantity(&isbn("123")), 6);
        assert_eq!(f.stock("123").await, 4);

        f.store.update_quantity(&me, &isbn("123"), 1).await.unwrap();
        assert_eq!(f.stock("123").await, 9);

        let view = f.store.remove_item(&me, &isbn("123")).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(f.stock("123").await, 10);

        assert!(matches!(
            f.store.remove_item(&me, &isbn("123")).await,
            Err(BookstoreError::LineNotInCart(_))
        ));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 2).await.unwrap();

        let view = f.store.update_quantity(&me, &isbn("123"), 0).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(f.stock("123").await, 10);
    }

    #[tokio::test]
    async fn test_update_beyond_stock_fails() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 3).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 2).await.unwrap();

        let err = f.store.update_quantity(&me, &isbn("123"), 5).await.unwrap_err();
        assert!(matches!(err, BookstoreError::InsufficientStock { requested: 3, available: 1, .. }));
        assert_eq!(f.stock("123").await, 1);
    }

    #[tokio::test]
    async fn test_clear_cart_releases_everything() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        f.book("456", "Go", 800, 10).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 3).await.unwrap();
        f.store.add_to_cart(&me, &isbn("456"), 2).await.unwrap();

        let view = f.store.clear_cart(&me).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(f.stock("123").await, 10);
        assert_eq!(f.stock("456").await, 10);
    }
}
