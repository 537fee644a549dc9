//! Pending cart: quick adds held against a session until the next cart access.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Isbn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLine {
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCart {
    session_key: String,
    lines: BTreeMap<Isbn, PendingLine>,
}

impl PendingCart {
    pub fn new(session_key: impl Into<String>) -> Self {
        Self { session_key: session_key.into(), lines: BTreeMap::new() }
    }

    pub fn restore(session_key: impl Into<String>, lines: impl IntoIterator<Item = (Isbn, PendingLine)>) -> Self {
        Self { session_key: session_key.into(), lines: lines.into_iter().collect() }
    }

    pub fn session_key(&self) -> &str { &self.session_key }
    pub fn lines(&self) -> impl Iterator<Item = (&Isbn, &PendingLine)> { self.lines.iter() }
    pub fn quantity(&self, isbn: &Isbn) -> u32 { self.lines.get(isbn).map_or(0, |l| l.quantity) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Accumulates onto any line already held for the book and restarts its expiry.
    pub fn add(&mut self, isbn: Isbn, quantity: u32, now: DateTime<Utc>, ttl: Duration) {
        let expires_at = now + ttl;
        self.lines
            .entry(isbn)
            .and_modify(|l| { l.quantity = l.quantity.saturating_add(quantity); l.expires_at = expires_at; })
            .or_insert(PendingLine { quantity, expires_at });
    }

    /// Empties the cart, yielding its lines in ISBN order.
    pub fn drain(&mut self) -> Vec<(Isbn, PendingLine)> {
        std::mem::take(&mut self.lines).into_iter().collect()
    }

    /// Removes and returns lines whose expiry is at or before `now`.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<(Isbn, PendingLine)> {
        let expired: Vec<Isbn> = self.lines.iter().filter(|(_, l)| l.expires_at <= now).map(|(i, _)| i.clone()).collect();
        expired.into_iter().filter_map(|isbn| self.lines.remove(&isbn).map(|l| (isbn, l))).collect()
    }
}
