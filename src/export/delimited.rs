use super::{AMOUNT_DP, QUANTITY_DP, REFERENCE_UNIT_DP, TOTALS_HEADERS, VALUES_HEADERS, fixed};
use crate::core::record::{AssetValue, PortfolioTotal, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Appends one row per asset, writing the header first if the file is new.
pub fn append_values(path: &Path, rows: &[AssetValue]) -> Result<()> {
    let mut writer = open_for_append(path, &VALUES_HEADERS)?;
    for row in rows {
        writer
            .write_record([
                row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                row.asset.clone(),
                fixed(row.balance, QUANTITY_DP),
                fixed(row.price, QUANTITY_DP),
                fixed(row.value, AMOUNT_DP),
                fixed(row.fiat_value, AMOUNT_DP),
                fixed(row.reference_unit_value, REFERENCE_UNIT_DP),
                row.source.clone(),
            ])
            .with_context(|| format!("Failed to write values row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    debug!(path = %path.display(), rows = rows.len(), "Appended values rows");
    Ok(())
}

pub fn append_total(path: &Path, total: &PortfolioTotal) -> Result<()> {
    let mut writer = open_for_append(path, &TOTALS_HEADERS)?;
    writer
        .write_record([
            total.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            fixed(total.total_value, AMOUNT_DP),
            fixed(total.total_fiat_value, AMOUNT_DP),
            fixed(total.total_reference_unit_value, REFERENCE_UNIT_DP),
        ])
        .with_context(|| format!("Failed to write totals row to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Opens `path` for appending. Existing bytes are never rewritten; the header
/// goes in only when the file is absent or empty.
fn open_for_append(path: &Path, headers: &[&str]) -> Result<Writer<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open export file: {}", path.display()))?;
    let is_empty = file
        .metadata()
        .with_context(|| format!("Failed to stat export file: {}", path.display()))?
        .len()
        == 0;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if is_empty {
        writer
            .write_record(headers)
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
    }
    Ok(writer)
}
