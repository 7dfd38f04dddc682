//! Append-only persistence of cycle snapshots in one of three formats.
//!
//! Every export writes two targets: the per-asset values file and the
//! portfolio totals file. Each target is updated on its own; a failure on
//! the totals target leaves the already-appended values in place.

pub mod delimited;
pub mod json;
pub mod spreadsheet;

use crate::core::balance::Balance;
use crate::core::config::{ExportConfig, ExportFormat};
use crate::core::record::Snapshot;
use crate::core::sink::SnapshotExporter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fs;
use tracing::{debug, info};

pub const VALUES_HEADERS: [&str; 8] = [
    "Timestamp",
    "Asset",
    "Balance",
    "Price",
    "Value",
    "FiatValue",
    "ReferenceUnitValue",
    "Source",
];

pub const TOTALS_HEADERS: [&str; 4] = [
    "Timestamp",
    "TotalValue",
    "TotalFiatValue",
    "TotalReferenceUnitValue",
];

/// Decimal places used for quantities and unit prices.
pub const QUANTITY_DP: u32 = 3;
/// Decimal places used for base-currency and fiat amounts.
pub const AMOUNT_DP: u32 = 2;
/// Decimal places used for reference-unit amounts.
pub const REFERENCE_UNIT_DP: u32 = 8;

/// Formats `value` with exactly `dp` decimals, rounding half away from zero.
pub fn fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

pub struct ExportEngine {
    config: ExportConfig,
}

impl ExportEngine {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Appends `snapshot` to both targets. Blocking; callers on the runtime
    /// go through [`SnapshotExporter::export_snapshot`].
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        write_snapshot(&self.config, snapshot)
    }
}

fn write_snapshot(config: &ExportConfig, snapshot: &Snapshot) -> Result<()> {
    fs::create_dir_all(&config.output_path).with_context(|| {
        format!(
            "Failed to create export directory: {}",
            config.output_path.display()
        )
    })?;

    let values_path = config.values_path();
    let totals_path = config.totals_path();
    debug!(
        format = %config.format,
        values = %values_path.display(),
        totals = %totals_path.display(),
        "Exporting snapshot"
    );

    match config.format {
        ExportFormat::Csv => {
            delimited::append_values(&values_path, &snapshot.values)?;
            delimited::append_total(&totals_path, &snapshot.total)?;
        }
        ExportFormat::Json => {
            json::append_values(&values_path, snapshot)?;
            json::append_total(&totals_path, &snapshot.total)?;
        }
        ExportFormat::Xlsx => {
            let rows = snapshot.values.iter().map(spreadsheet::values_row).collect();
            spreadsheet::append_rows(&values_path, spreadsheet::SheetKind::Values, rows)?;
            let rows = vec![spreadsheet::totals_row(&snapshot.total)];
            spreadsheet::append_rows(&totals_path, spreadsheet::SheetKind::Totals, rows)?;
        }
    }

    info!(
        format = %config.format,
        rows = snapshot.values.len(),
        path = %config.output_path.display(),
        "Exported snapshot"
    );
    Ok(())
}

#[async_trait]
impl SnapshotExporter for ExportEngine {
    async fn export_snapshot(
        &self,
        balances: &[Balance],
        fiat_rate: Decimal,
        reference_unit_price: Decimal,
    ) -> Result<()> {
        if !self.config.enabled {
            debug!("Export disabled, skipping");
            return Ok(());
        }

        let snapshot = Snapshot::capture(balances, fiat_rate, reference_unit_price);
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&config, &snapshot))
            .await
            .context("Export task panicked")?
    }
}
