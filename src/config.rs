//! Environment configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} is invalid: {1}")]
    Invalid(&'static str, String),
}

/// When a cart holds stock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StockPolicy {
    /// Adding to the cart takes units off the shelf.
    #[default]
    ReserveOnAdd,
    /// Adding only checks availability; checkout takes the units.
    DeductOnCheckout,
}

impl FromStr for StockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reserve-on-add" => Ok(Self::ReserveOnAdd),
            "deduct-on-checkout" => Ok(Self::DeductOnCheckout),
            other => Err(format!("expected reserve-on-add or deduct-on-checkout, got {other:?}")),
        }
    }
}

impl fmt::Display for StockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveOnAdd => write!(f, "reserve-on-add"),
            Self::DeductOnCheckout => write!(f, "deduct-on-checkout"),
        }
    }
}

/// Behaviour knobs of the store itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub stock_policy: StockPolicy,
    /// How long a quick add stays reserved before `restore-stock` may release it.
    pub pending_ttl: chrono::Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self { stock_policy: StockPolicy::default(), pending_ttl: chrono::Duration::seconds(900) }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub settings: Settings,
}

impl Config {
    /// Reads the process environment after loading `.env`, if any.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty()).ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let pending_ttl_secs: i64 = parse_or(&lookup, "BOOKSTORE_PENDING_TTL_SECS", 900)?;
        if pending_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("BOOKSTORE_PENDING_TTL_SECS", "must be positive".into()));
        }

        Ok(Self {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8083)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            settings: Settings {
                stock_policy: parse_or(&lookup, "BOOKSTORE_STOCK_POLICY", StockPolicy::default())?,
                pending_ttl: chrono::Duration::seconds(pending_ttl_secs),
            },
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string())),
        None => Ok(default),
    }
}
