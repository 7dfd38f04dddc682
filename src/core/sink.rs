//! Collaborators the orchestrator pushes a finished cycle into.

use crate::core::balance::Balance;
use crate::core::record::{AssetValue, PortfolioTotal};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Renders a cycle's balances for a human.
pub trait DisplaySink: Send + Sync {
    fn render(&self, balances: &[Balance], fiat_rate: Decimal, reference_unit_price: Decimal);
}

/// Appends a cycle's balances to persistent storage.
#[async_trait]
pub trait SnapshotExporter: Send + Sync {
    async fn export_snapshot(
        &self,
        balances: &[Balance],
        fiat_rate: Decimal,
        reference_unit_price: Decimal,
    ) -> Result<()>;
}

/// Remote sink notified with every valued balance and the portfolio total.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, value: &AssetValue) -> Result<()>;

    async fn publish_total(&self, total: &PortfolioTotal) -> Result<()>;
}
