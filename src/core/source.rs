//! Collaborators the orchestrator pulls data from.

use crate::core::balance::Balance;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A provider of asset balances (exchange account, manual list, price feed).
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Name used in logs and retry errors.
    fn name(&self) -> &str;

    async fn fetch_balances(&self) -> Result<Vec<Balance>>;
}

/// Conversion rate from the base currency into the configured fiat currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn current_rate(&self) -> Result<Decimal>;
}
