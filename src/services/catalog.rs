use serde::Serialize;

use super::Bookstore;
use crate::domain::aggregates::Book;
use crate::domain::value_objects::Isbn;
use crate::repository::Page;
use crate::{BookstoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub books: u64,
    pub orders: u64,
}

impl Bookstore {
    /// Books ordered by title.
    pub async fn list_books(&self, page: Page) -> Result<Vec<Book>> {
        Ok(self.repo.list_books(page).await?)
    }

    pub async fn find_book(&self, isbn: &Isbn) -> Result<Book> {
        self.repo.find_book(isbn).await?.ok_or_else(|| BookstoreError::BookNotFound(isbn.clone()))
    }

    pub async fn summary(&self) -> Result<StoreSummary> {
        Ok(StoreSummary { books: self.repo.count_books().await?, orders: self.repo.count_orders().await? })
    }
}
