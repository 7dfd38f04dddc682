use super::ui::{StyleType, header_cell, new_styled_table, number_cell, style_text};
use crate::core::record::{AssetValue, PortfolioTotal, TIMESTAMP_FORMAT};
use crate::export::{AMOUNT_DP, QUANTITY_DP, REFERENCE_UNIT_DP, fixed};
use crate::history::{self, HistoryQuery, Parsed, TotalsQuery};
use anyhow::Result;
use comfy_table::{Cell, Table};
use std::path::Path;

/// Returns `None` (after telling the user) when there is nothing to show.
fn load<T>(
    path: &Path,
    read: impl FnOnce(&Path) -> Result<Parsed<T>>,
) -> Result<Option<Vec<T>>> {
    if !path.exists() {
        println!(
            "{}",
            style_text(
                &format!("No history file found at {}", path.display()),
                StyleType::Error
            )
        );
        return Ok(None);
    }

    let parsed = read(path)?;
    if !parsed.warnings.is_empty() {
        println!(
            "{}",
            style_text(
                &format!("Skipped {} malformed line(s)", parsed.warnings.len()),
                StyleType::Subtle
            )
        );
    }
    if parsed.entries.is_empty() {
        println!("No data rows in {}", path.display());
        return Ok(None);
    }
    Ok(Some(parsed.entries))
}

pub fn show_history(path: &Path, query: &HistoryQuery) -> Result<()> {
    let Some(entries) = load(path, history::read_values_file)? else {
        return Ok(());
    };
    let entries = query.apply(entries);
    if entries.is_empty() {
        println!("No entries match the given filters");
        return Ok(());
    }

    println!("{}", style_text("Portfolio History", StyleType::Title));
    println!("{}", values_table(&entries));
    println!(
        "{}",
        style_text(&format!("{} entries", entries.len()), StyleType::Subtle)
    );
    Ok(())
}

pub fn show_totals(path: &Path, query: &TotalsQuery) -> Result<()> {
    let Some(entries) = load(path, history::read_totals_file)? else {
        return Ok(());
    };
    let entries = query.apply(entries);

    println!("{}", style_text("Portfolio Totals", StyleType::Title));
    println!("{}", totals_table(&entries));
    Ok(())
}

pub fn show_assets(path: &Path) -> Result<()> {
    let Some(entries) = load(path, history::read_values_file)? else {
        return Ok(());
    };

    let mut table = new_styled_table();
    table.set_header(vec![header_cell("Asset"), header_cell("Source")]);
    for (asset, source) in history::unique_assets(&entries) {
        table.add_row(vec![Cell::new(asset), Cell::new(source)]);
    }

    println!("{}", style_text("Tracked Assets", StyleType::Title));
    println!("{table}");
    Ok(())
}

fn values_table(entries: &[AssetValue]) -> Table {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Timestamp"),
        header_cell("Asset"),
        header_cell("Balance"),
        header_cell("Price"),
        header_cell("Value"),
        header_cell("Fiat Value"),
        header_cell("Reference Value"),
        header_cell("Source"),
    ]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.timestamp.format(TIMESTAMP_FORMAT)),
            Cell::new(&e.asset),
            number_cell(fixed(e.balance, QUANTITY_DP)),
            number_cell(fixed(e.price, QUANTITY_DP)),
            number_cell(fixed(e.value, AMOUNT_DP)),
            number_cell(fixed(e.fiat_value, AMOUNT_DP)),
            number_cell(fixed(e.reference_unit_value, REFERENCE_UNIT_DP)),
            Cell::new(&e.source),
        ]);
    }
    table
}

fn totals_table(entries: &[PortfolioTotal]) -> Table {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Timestamp"),
        header_cell("Total Value"),
        header_cell("Total Fiat Value"),
        header_cell("Total Reference Value"),
    ]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.timestamp.format(TIMESTAMP_FORMAT)),
            number_cell(fixed(e.total_value, AMOUNT_DP)),
            number_cell(fixed(e.total_fiat_value, AMOUNT_DP)),
            number_cell(fixed(e.total_reference_unit_value, REFERENCE_UNIT_DP)),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        assert!(show_history(&path, &HistoryQuery::default()).is_ok());
        assert!(show_totals(&path, &TotalsQuery::default()).is_ok());
        assert!(show_assets(&path).is_ok());
    }

    #[test]
    fn test_values_table_lists_filtered_rows() {
        let csv = "\
Timestamp,Asset,Balance,Price,Value,FiatValue,ReferenceUnitValue,Source
2024-01-01 10:00:00,BTC,0.500,60000.000,30000.00,300000.00,0.50000000,Manual
2024-01-01 10:00:00,ETH,2.000,3000.000,6000.00,60000.00,0.10000000,Manual
";
        let entries = history::parse_values(csv.as_bytes()).unwrap().entries;
        let query = HistoryQuery {
            asset: Some("eth".to_string()),
            ..Default::default()
        };
        let rendered = values_table(&query.apply(entries)).to_string();
        assert!(rendered.contains("ETH"));
        assert!(rendered.contains("6000.00"));
        assert!(!rendered.contains("BTC"));
    }

    #[test]
    fn test_header_only_file_shows_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("totals.csv");
        fs::write(&path, "Timestamp,TotalValue,TotalFiatValue,TotalReferenceUnitValue\n").unwrap();
        let loaded = load(&path, history::read_totals_file).unwrap();
        assert!(loaded.is_none());
    }
}
