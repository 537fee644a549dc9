use std::sync::Arc;

use bookstore_sales::domain::aggregates::{OrderItem, OrderStatus};
use bookstore_sales::domain::value_objects::{Isbn, Money};
use bookstore_sales::report::SalesReport;
use bookstore_sales::repository::MemoryRepository;
use bookstore_sales::services::{CartIdentity, CheckoutForm, CheckoutOutcome, RegisterCustomer};
use bookstore_sales::{Bookstore, Settings};

const CATALOG: &str = r#"[
    {"isbn": "9787115428028", "title": "Python Crash Course", "author": "Eric Matthes", "price": "89.00元", "stock": 5},
    {"isbn": "9787111213826", "title": "Thinking in Java", "price": "108.00元", "stock": 3}
]"#;

async fn store() -> Bookstore {
    let store = Bookstore::with_log_events(Arc::new(MemoryRepository::new()), Settings::default());
    store.import_books(CATALOG).await.unwrap();
    store
}

fn isbn(s: &str) -> Isbn {
    Isbn::new(s).unwrap()
}

#[tokio::test]
async fn test_vip_shops_as_guest_then_signs_in_and_pays() {
    let store = store().await;
    let ann = store
        .register_customer(RegisterCustomer { username: "ann".into(), name: "Ann".into(), phone: "555".into() })
        .await
        .unwrap();
    store.set_vip(ann.id, true).await.unwrap();

    let guest = CartIdentity::anonymous("browser-1");
    assert_eq!(store.add_to_cart(&guest, &isbn("9787115428028"), 2).await.unwrap(), 3);
    assert_eq!(store.add_to_cart(&guest, &isbn("9787111213826"), 1).await.unwrap(), 2);
    let before_login = store.view_cart(&guest).await.unwrap();
    assert_eq!(before_login.totals.total, Money::from_cents(28600));
    assert!(!before_login.totals.vip_discount_active);

    let signed_in = CartIdentity::customer("browser-1", ann.id);
    let cart = store.view_cart(&signed_in).await.unwrap();
    assert_eq!(cart.totals.original_total, Money::from_cents(28600));
    assert_eq!(cart.totals.total, Money::from_cents(25740));
    assert!(cart.totals.vip_discount_active);

    let CheckoutOutcome::Placed { order, .. } =
        store.checkout(&signed_in, CheckoutForm::new("Ann", "555")).await.unwrap()
    else {
        panic!("checkout placed no order");
    };
    let sum: Money = order.items().iter().map(OrderItem::subtotal).sum();
    assert_eq!(sum, order.final_total());
    assert_eq!(order.discount_amount(), Money::from_cents(2860));
    assert_eq!(order.status(), OrderStatus::Unpaid);

    store.mark_paid(order.id()).await.unwrap();
    let report = SalesReport::build(store.repository().as_ref(), chrono::Utc::now()).await.unwrap();
    assert_eq!(report.last_week.totals.revenue, Money::from_cents(25740));
    assert_eq!(report.top_customers[0].username, "ann");

    assert!(store.view_cart(&signed_in).await.unwrap().items.is_empty());
    assert_eq!(store.find_book(&isbn("9787115428028")).await.unwrap().stock().value(), 3);
}

#[tokio::test]
async fn test_sold_out_book_blocks_second_shopper() {
    let store = store().await;
    let first = CartIdentity::anonymous("a");
    let second = CartIdentity::anonymous("b");

    store.add_to_cart(&first, &isbn("9787111213826"), 3).await.unwrap();
    let err = store.add_to_cart(&second, &isbn("9787111213826"), 1).await.unwrap_err();
    assert!(err.to_string().contains("Thinking in Java"));

    store.clear_cart(&first).await.unwrap();
    assert_eq!(store.add_to_cart(&second, &isbn("9787111213826"), 1).await.unwrap(), 2);
}
