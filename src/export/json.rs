use crate::core::record::{PortfolioTotal, Snapshot, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use tracing::warn;

#[derive(Serialize)]
struct ValuesEntry<'a> {
    timestamp: String,
    balances: Vec<BalanceEntry<'a>>,
}

#[derive(Serialize)]
struct BalanceEntry<'a> {
    asset: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    fiat_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    reference_unit_value: Decimal,
    source: &'a str,
}

#[derive(Serialize)]
struct TotalEntry {
    timestamp: String,
    #[serde(with = "rust_decimal::serde::float")]
    total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    total_fiat_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    total_reference_unit_value: Decimal,
}

/// Appends the snapshot's balances as one array element.
pub fn append_values(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let entry = ValuesEntry {
        timestamp: snapshot.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        balances: snapshot
            .values
            .iter()
            .map(|v| BalanceEntry {
                asset: &v.asset,
                balance: v.balance,
                price: v.price,
                value: v.value,
                fiat_value: v.fiat_value,
                reference_unit_value: v.reference_unit_value,
                source: &v.source,
            })
            .collect(),
    };
    append_entry(path, serde_json::to_value(&entry)?)
}

pub fn append_total(path: &Path, total: &PortfolioTotal) -> Result<()> {
    let entry = TotalEntry {
        timestamp: total.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        total_value: total.total_value,
        total_fiat_value: total.total_fiat_value,
        total_reference_unit_value: total.total_reference_unit_value,
    };
    append_entry(path, serde_json::to_value(&entry)?)
}

fn append_entry(path: &Path, entry: Value) -> Result<()> {
    let mut entries = read_entries(path)?;
    entries.push(entry);

    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &entries)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Loads the existing array. A missing file starts a new one; content that
/// is not a JSON array is discarded with a warning.
fn read_entries(path: &Path) -> Result<Vec<Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read export file: {}", path.display()));
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Vec<Value>>(&content) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!(path = %path.display(), "Existing JSON export is unreadable, starting a new array: {e}");
            Ok(Vec::new())
        }
    }
}
