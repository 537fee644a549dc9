//! Catalog import and release of lapsed reservations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::Bookstore;
use crate::config::StockPolicy;
use crate::domain::aggregates::{Book, CartOwner};
use crate::domain::events::{BookEvent, DomainEvent};
use crate::domain::value_objects::{Isbn, Money};
use crate::repository::RepositoryError;

const DEFAULT_AUTHOR: &str = "Unknown";
const DEFAULT_PRESS: &str = "Unknown Press";
const DEFAULT_SUMMARY: &str = "None";
const CURRENCY_SUFFIX: char = '元';

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record {index}: missing key {key}")]
    MissingKey { index: usize, key: &'static str },

    #[error("Record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestockSummary {
    pub sessions: usize,
    pub lines: usize,
    pub units: u64,
}

/// Strips the currency marker; anything unparsable or negative is free.
fn parse_price(raw: Option<&Value>) -> Money {
    let amount = match raw {
        Some(Value::String(s)) => Decimal::from_str(s.trim().trim_end_matches(CURRENCY_SUFFIX).trim()).ok(),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    match amount {
        Some(a) if a >= Decimal::ZERO => Money::new(a).to_cents_precision(),
        _ => Money::ZERO,
    }
}

fn text(record: &Map<String, Value>, key: &str, default: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

fn required<'a>(record: &'a Map<String, Value>, index: usize, key: &'static str) -> Result<&'a Value, ImportError> {
    record.get(key).ok_or(ImportError::MissingKey { index, key })
}

fn parse_record(index: usize, value: &Value) -> Result<Book, ImportError> {
    let invalid = |reason: String| ImportError::InvalidRecord { index, reason };
    let record = value.as_object().ok_or_else(|| invalid("expected an object".into()))?;

    let isbn = match required(record, index, "isbn")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(invalid(format!("isbn must be a string, got {other}"))),
    };
    let isbn = Isbn::new(isbn).map_err(|e| invalid(e.to_string()))?;

    let title = required(record, index, "title")?
        .as_str()
        .ok_or_else(|| invalid("title must be a string".into()))?
        .to_string();
    if title.chars().count() > Book::MAX_TITLE_CHARS {
        return Err(invalid(format!("title longer than {} characters", Book::MAX_TITLE_CHARS)));
    }

    let stock = match required(record, index, "stock")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .and_then(|n| u32::try_from(n).ok())
    .ok_or_else(|| invalid("stock must be a non-negative integer".into()))?;

    Ok(Book::new(isbn, title, parse_price(record.get("price")), stock)
        .with_author(Some(text(record, "author", DEFAULT_AUTHOR)))
        .with_press(Some(text(record, "press", DEFAULT_PRESS)))
        .with_summary(Some(text(record, "summary", DEFAULT_SUMMARY))))
}

impl Bookstore {
    /// Upserts every book of a JSON array by ISBN. Any bad record aborts the
    /// whole import.
    #[instrument(skip(self, json))]
    pub async fn import_books(&self, json: &str) -> Result<ImportSummary, ImportError> {
        let records: Vec<Value> = serde_json::from_str(json)?;
        let books = records.iter().enumerate().map(|(i, r)| parse_record(i, r)).collect::<Result<Vec<_>, _>>()?;

        let mut summary = ImportSummary::default();
        let mut events = Vec::with_capacity(books.len());
        let mut uow = self.repo.begin().await?;
        for book in &books {
            if uow.lock_book(book.isbn()).await?.is_some() {
                summary.updated += 1;
            } else {
                summary.created += 1;
            }
            uow.save_book(book).await?;
            info!(isbn = %book.isbn(), title = book.title(), "imported");
            events.push(DomainEvent::Book(BookEvent::Imported { isbn: book.isbn().clone() }));
        }
        uow.commit().await?;

        self.publish(events).await;
        Ok(summary)
    }

    pub async fn import_books_file(&self, path: impl AsRef<Path>) -> Result<ImportSummary, ImportError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ImportError::Io { path: path.to_path_buf(), source })?;
        self.import_books(&json).await
    }

    /// Drops lapsed holds: quick adds whose expiry is at or before `now`, and
    /// anonymous carts nobody has changed for the pending TTL. Under
    /// [`StockPolicy::ReserveOnAdd`] their units go back on the shelf.
    #[instrument(skip(self))]
    pub async fn restore_expired_reservations(&self, now: DateTime<Utc>) -> crate::Result<RestockSummary> {
        let mut sessions = BTreeSet::new();
        let mut lapsed: Vec<(Isbn, u32)> = Vec::new();
        let mut uow = self.repo.begin().await?;

        for mut pending in uow.expired_pending_carts(now).await? {
            let expired = pending.take_expired(now);
            if expired.is_empty() {
                continue;
            }
            sessions.insert(pending.session_key().to_string());
            lapsed.extend(expired.into_iter().map(|(isbn, line)| (isbn, line.quantity)));
            uow.save_pending_cart(&pending).await?;
        }

        for cart in uow.stale_session_carts(now - self.settings.pending_ttl).await? {
            match cart.owner() {
                CartOwner::Session(key) if !cart.is_empty() => { sessions.insert(key.clone()); }
                _ => {}
            }
            if let Some(id) = cart.id() {
                uow.delete_cart(id).await?;
            }
            lapsed.extend(cart.items().iter().map(|i| (i.isbn.clone(), i.quantity)));
        }

        let mut summary = RestockSummary { sessions: sessions.len(), ..RestockSummary::default() };
        let mut events = Vec::new();
        for (isbn, quantity) in lapsed {
            summary.lines += 1;
            summary.units += u64::from(quantity);
            if self.settings.stock_policy != StockPolicy::ReserveOnAdd {
                continue;
            }
            match uow.lock_book(&isbn).await? {
                Some(mut book) => {
                    book.release(quantity);
                    uow.save_book(&book).await?;
                    events.extend(book.take_events());
                }
                None => warn!(%isbn, "expired reservation for missing book"),
            }
        }
        uow.commit().await?;

        info!(sessions = summary.sessions, lines = summary.lines, units = summary.units, "expired reservations released");
        self.publish(events).await;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::testing::{fixture, isbn};
    use crate::services::CartIdentity;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(Some(&Value::from("39.80元"))), Money::from_cents(3980));
        assert_eq!(parse_price(Some(&Value::from(" 12 "))), Money::from_cents(1200));
        assert_eq!(parse_price(Some(&Value::from(25.5))), Money::from_cents(2550));
        assert_eq!(parse_price(Some(&Value::from("free"))), Money::ZERO);
        assert_eq!(parse_price(None), Money::ZERO);
    }

    #[tokio::test]
    async fn test_import_upserts_with_defaults() {
        let f = fixture(Settings::default());
        f.book("111", "Old title", 100, 1).await;
        let json = r#"[
            {"isbn": "111", "title": "New title", "price": "45.00元", "stock": 7},
            {"isbn": "222", "title": "Second", "author": "Li", "price": "oops", "stock": "3"}
        ]"#;

        let summary = f.store.import_books(json).await.unwrap();
        assert_eq!(summary, ImportSummary { created: 1, updated: 1 });

        let first = f.store.find_book(&isbn("111")).await.unwrap();
        assert_eq!(first.title(), "New title");
        assert_eq!(first.price(), Money::from_cents(4500));
        assert_eq!(first.stock().value(), 7);
        assert_eq!(first.author(), Some(DEFAULT_AUTHOR));
        assert_eq!(first.press(), Some(DEFAULT_PRESS));
        assert_eq!(first.summary(), Some(DEFAULT_SUMMARY));

        let second = f.store.find_book(&isbn("222")).await.unwrap();
        assert_eq!(second.author(), Some("Li"));
        assert_eq!(second.price(), Money::ZERO);
        assert_eq!(f.events.subjects(), vec!["bookstore.books.imported"; 2]);
    }

    #[tokio::test]
    async fn test_import_missing_key_aborts() {
        let f = fixture(Settings::default());
        let json = r#"[{"isbn": "111", "title": "Fine", "stock": 1}, {"isbn": "222", "title": "No stock"}]"#;

        let err = f.store.import_books(json).await.unwrap_err();
        assert!(matches!(err, ImportError::MissingKey { index: 1, key: "stock" }));
        assert_eq!(f.store.summary().await.unwrap().books, 0);
    }

    #[tokio::test]
    async fn test_import_rejects_long_title() {
        let f = fixture(Settings::default());
        let at_limit = "书".repeat(Book::MAX_TITLE_CHARS);
        let json = serde_json::json!([
            {"isbn": "111", "title": at_limit, "stock": 1},
            {"isbn": "222", "title": format!("{at_limit}!"), "stock": 1},
        ])
        .to_string();

        let err = f.store.import_books(&json).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidRecord { index: 1, .. }));
        assert_eq!(f.store.summary().await.unwrap().books, 0);

        let ok = serde_json::json!([{"isbn": "111", "title": at_limit, "stock": 1}]).to_string();
        assert_eq!(f.store.import_books(&ok).await.unwrap().created, 1);
    }

    #[tokio::test]
    async fn test_import_file_not_found() {
        let f = fixture(Settings::default());
        let err = f.store.import_books_file("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }

    #[tokio::test]
    async fn test_restore_expired_reservations() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        let quick = CartIdentity::anonymous("s1");
        let viewed = CartIdentity::anonymous("s2");
        f.store.add_to_cart(&quick, &isbn("123"), 3).await.unwrap();
        f.store.add_to_cart(&viewed, &isbn("123"), 2).await.unwrap();
        f.store.view_cart(&viewed).await.unwrap();
        assert_eq!(f.stock("123").await, 5);

        let untouched = f.store.restore_expired_reservations(Utc::now()).await.unwrap();
        assert_eq!(untouched, RestockSummary::default());
        assert_eq!(f.stock("123").await, 5);

        let later = Utc::now() + f.store.settings().pending_ttl + chrono::Duration::seconds(1);
        let summary = f.store.restore_expired_reservations(later).await.unwrap();
        assert_eq!(summary, RestockSummary { sessions: 2, lines: 2, units: 5 });
        assert_eq!(f.stock("123").await, 10);
        assert!(f.store.view_cart(&quick).await.unwrap().items.is_empty());
        assert!(f.store.view_cart(&viewed).await.unwrap().items.is_empty());

        let again = f.store.restore_expired_reservations(later).await.unwrap();
        assert_eq!(again, RestockSummary::default());
    }

    #[tokio::test]
    async fn test_restore_keeps_customer_carts() {
        let f = fixture(Settings::default());
        f.book("123", "Rust", 1000, 10).await;
        let ann = f.customer("ann", false).await;
        let me = CartIdentity::customer("s1", ann.id);
        f.store.add_to_cart(&me, &isbn("123"), 4).await.unwrap();
        f.store.view_cart(&me).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(365);
        assert_eq!(f.store.restore_expired_reservations(later).await.unwrap(), RestockSummary::default());
        assert_eq!(f.stock("123").await, 6);
        assert_eq!(f.store.view_cart(&me).await.unwrap().quantity(&isbn("123")), 4);
    }

    #[tokio::test]
    async fn test_restore_without_reservations_leaves_stock() {
        let f = fixture(Settings { stock_policy: StockPolicy::DeductOnCheckout, ..Settings::default() });
        f.book("123", "Rust", 1000, 10).await;
        let me = CartIdentity::anonymous("s1");
        f.store.add_to_cart(&me, &isbn("123"), 4).await.unwrap();
        f.store.view_cart(&me).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(1);
        let summary = f.store.restore_expired_reservations(later).await.unwrap();
        assert_eq!(summary, RestockSummary { sessions: 1, lines: 1, units: 4 });
        assert_eq!(f.stock("123").await, 10);
        assert!(f.store.view_cart(&me).await.unwrap().items.is_empty());
    }
}
