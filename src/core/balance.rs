//! Per-asset balance captured from a source.

use chrono::{DateTime, Local};
use rust_decimal::Decimal;

/// Holding of one asset as reported by a source at fetch time.
///
/// `value` is computed once in the constructor and there are no setters, so it
/// always equals `price * balance` at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    asset: String,
    balance: Decimal,
    price: Decimal,
    value: Decimal,
    source: String,
    timestamp: DateTime<Local>,
}

impl Balance {
    /// Creates a balance stamped with the current local time.
    pub fn new(
        asset: impl Into<String>,
        balance: Decimal,
        price: Decimal,
        source: impl Into<String>,
    ) -> Self {
        Self::at(asset, balance, price, source, Local::now())
    }

    pub fn at(
        asset: impl Into<String>,
        balance: Decimal,
        price: Decimal,
        source: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        let value = price.checked_mul(balance).unwrap_or(Decimal::MAX);
        Self {
            asset: asset.into(),
            balance,
            price,
            value,
            source: source.into(),
            timestamp,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}
