//! XLSX targets. A workbook cannot be appended in place, so every append reads
//! the current rows back, rebuilds the workbook with the new rows at the end,
//! and swaps it in through a scratch file next to the target.

use super::{TOTALS_HEADERS, VALUES_HEADERS};
use crate::core::record::{AssetValue, PortfolioTotal, TIMESTAMP_FORMAT};
use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Chart, ChartType, Format, Table, TableColumn, Workbook, Worksheet};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hidden sheet holding one column per asset so each gets its own series.
const CHART_DATA_SHEET: &str = "ChartData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Values,
    Totals,
}

impl SheetKind {
    pub fn sheet_name(&self) -> &'static str {
        match self {
            SheetKind::Values => "Values",
            SheetKind::Totals => "Totals",
        }
    }

    fn table_name(&self) -> &'static str {
        match self {
            SheetKind::Values => "ValuesTable",
            SheetKind::Totals => "TotalsTable",
        }
    }

    fn chart_title(&self) -> &'static str {
        match self {
            SheetKind::Values => "Portfolio Value by Asset",
            SheetKind::Totals => "Total Portfolio Value",
        }
    }

    fn headers(&self) -> &'static [&'static str] {
        match self {
            SheetKind::Values => &VALUES_HEADERS,
            SheetKind::Totals => &TOTALS_HEADERS,
        }
    }

    /// Column plotted on the chart's Y axis.
    fn value_column(&self) -> u16 {
        match self {
            SheetKind::Values => 4,
            SheetKind::Totals => 1,
        }
    }

    fn number_format(&self, col: usize) -> Option<&'static str> {
        match (self, col) {
            (SheetKind::Values, 2 | 3) => Some("0.000"),
            (SheetKind::Values, 4 | 5) | (SheetKind::Totals, 1 | 2) => Some("0.00"),
            (SheetKind::Values, 6) | (SheetKind::Totals, 3) => Some("0.00000000"),
            _ => None,
        }
    }
}

/// Cell content as read back from, or written to, a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn number(value: Decimal) -> Self {
        Cell::Number(value.to_f64().unwrap_or_default())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::Error(e) => Cell::Text(e.to_string()),
        }
    }
}

pub fn values_row(value: &AssetValue) -> Vec<Cell> {
    vec![
        Cell::text(value.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        Cell::text(value.asset.as_str()),
        Cell::number(value.balance),
        Cell::number(value.price),
        Cell::number(value.value),
        Cell::number(value.fiat_value),
        Cell::number(value.reference_unit_value),
        Cell::text(value.source.as_str()),
    ]
}

pub fn totals_row(total: &PortfolioTotal) -> Vec<Cell> {
    vec![
        Cell::text(total.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        Cell::number(total.total_value),
        Cell::number(total.total_fiat_value),
        Cell::number(total.total_reference_unit_value),
    ]
}

/// Reads every non-blank row of the target's data sheet, header included.
pub fn read_rows(path: &Path, kind: SheetKind) -> Result<Vec<Vec<Cell>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let range = workbook
        .worksheet_range(kind.sheet_name())
        .with_context(|| {
            format!(
                "Worksheet '{}' not found in {}",
                kind.sheet_name(),
                path.display()
            )
        })?;

    Ok(range
        .rows()
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

/// Appends `rows` after the last used row of `path`, creating the workbook
/// when it does not exist. The target is only ever replaced by a complete
/// workbook; on failure it is left as it was and the scratch file removed.
pub fn append_rows(path: &Path, kind: SheetKind, rows: Vec<Vec<Cell>>) -> Result<()> {
    let scratch = scratch_path(path);
    let result = rewrite(path, &scratch, kind, rows);
    if result.is_err() && scratch.exists() {
        if let Err(e) = fs::remove_file(&scratch) {
            warn!(path = %scratch.display(), "Failed to remove scratch workbook: {e}");
        }
    }
    result
}

fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.xlsx".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

fn rewrite(path: &Path, scratch: &Path, kind: SheetKind, rows: Vec<Vec<Cell>>) -> Result<()> {
    let mut data = if path.exists() {
        fs::copy(path, scratch)
            .with_context(|| format!("Failed to copy {} to scratch file", path.display()))?;
        read_rows(scratch, kind)?
    } else {
        Vec::new()
    };

    let header = if data.is_empty() {
        kind.headers().iter().map(|h| Cell::text(*h)).collect()
    } else {
        data.remove(0)
    };
    let appended = rows.len();
    data.extend(rows);

    let mut workbook = build_workbook(kind, &header, &data)?;
    workbook
        .save(scratch)
        .with_context(|| format!("Failed to write workbook: {}", scratch.display()))?;
    fs::rename(scratch, path)
        .with_context(|| format!("Failed to replace workbook: {}", path.display()))?;

    debug!(
        path = %path.display(),
        appended,
        total_rows = data.len(),
        "Workbook updated"
    );
    Ok(())
}

fn build_workbook(kind: SheetKind, header: &[Cell], data: &[Vec<Cell>]) -> Result<Workbook> {
    if data.is_empty() {
        return Err(anyhow!("No rows to write to the {} sheet", kind.sheet_name()));
    }

    let columns = header.len().max(kind.headers().len());
    let mut sheet = Worksheet::new();
    sheet.set_name(kind.sheet_name())?;

    let formats: Vec<Option<Format>> = (0..columns)
        .map(|col| kind.number_format(col).map(|f| Format::new().set_num_format(f)))
        .collect();

    for (row_idx, row) in data.iter().enumerate() {
        let row_num = row_idx as u32 + 1;
        for (col_idx, cell) in row.iter().enumerate().take(columns) {
            let col = col_idx as u16;
            match (cell, &formats[col_idx]) {
                (Cell::Empty, _) => {}
                (Cell::Text(s), _) => {
                    sheet.write_string(row_num, col, s)?;
                }
                (Cell::Number(n), Some(format)) => {
                    sheet.write_number_with_format(row_num, col, *n, format)?;
                }
                (Cell::Number(n), None) => {
                    sheet.write_number(row_num, col, *n)?;
                }
            }
        }
    }

    let last_row = data.len() as u32;
    let last_col = columns as u16 - 1;
    let table_columns: Vec<TableColumn> = (0..columns)
        .map(|col| TableColumn::new().set_header(header_name(kind, header, col)))
        .collect();
    let table = Table::new()
        .set_name(kind.table_name())
        .set_columns(&table_columns);
    sheet.add_table(0, 0, last_row, last_col, &table)?;

    let (chart, pivot) = match kind {
        SheetKind::Values => {
            let (chart, pivot) = values_chart(kind, data)?;
            (chart, Some(pivot))
        }
        SheetKind::Totals => (totals_chart(kind, last_row), None),
    };
    if let Some(chart) = chart {
        sheet.insert_chart(1, last_col + 2, &chart)?;
    }
    sheet.autofit();

    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet);
    if let Some(pivot) = pivot {
        workbook.push_worksheet(pivot);
    }
    Ok(workbook)
}

fn header_name(kind: SheetKind, header: &[Cell], col: usize) -> String {
    match header.get(col) {
        Some(Cell::Text(name)) if !name.is_empty() => name.clone(),
        Some(Cell::Number(n)) => n.to_string(),
        _ => kind
            .headers()
            .get(col)
            .map(|h| h.to_string())
            .unwrap_or_else(|| format!("Column{}", col + 1)),
    }
}

fn new_line_chart(kind: SheetKind) -> Chart {
    let mut chart = Chart::new(ChartType::Line);
    chart.title().set_name(kind.chart_title());
    chart.x_axis().set_name("Timestamp");
    chart.y_axis().set_name("Value");
    chart
}

fn totals_chart(kind: SheetKind, last_row: u32) -> Option<Chart> {
    let sheet = kind.sheet_name();
    let col = kind.value_column();
    let mut chart = new_line_chart(kind);
    chart
        .add_series()
        .set_name((sheet, 0, col))
        .set_categories((sheet, 1, 0, last_row, 0))
        .set_values((sheet, 1, col, last_row, col));
    Some(chart)
}

/// Pivots the values rows into one column per asset keyed by timestamp, and
/// charts each column as its own series. Rows without a text timestamp, a
/// text asset and a numeric value are left off the chart.
fn values_chart(kind: SheetKind, data: &[Vec<Cell>]) -> Result<(Option<Chart>, Worksheet)> {
    let value_col = kind.value_column() as usize;
    let mut timestamps: Vec<&str> = Vec::new();
    let mut timestamp_rows: HashMap<&str, u32> = HashMap::new();
    let mut assets: Vec<&str> = Vec::new();
    let mut asset_cols: HashMap<&str, u16> = HashMap::new();
    let mut points: Vec<(u32, u16, f64)> = Vec::new();

    for row in data {
        let timestamp = row.first().and_then(Cell::as_text);
        let asset = row.get(1).and_then(Cell::as_text);
        let value = row.get(value_col).and_then(Cell::as_number);
        let (Some(timestamp), Some(asset), Some(value)) = (timestamp, asset, value) else {
            continue;
        };

        let row_num = *timestamp_rows.entry(timestamp).or_insert_with(|| {
            timestamps.push(timestamp);
            timestamps.len() as u32
        });
        let col = *asset_cols.entry(asset).or_insert_with(|| {
            assets.push(asset);
            assets.len() as u16
        });
        points.push((row_num, col, value));
    }

    let mut pivot = Worksheet::new();
    pivot.set_name(CHART_DATA_SHEET)?;
    pivot.set_hidden(true);
    pivot.write_string(0, 0, "Timestamp")?;
    for (idx, asset) in assets.iter().enumerate() {
        pivot.write_string(0, idx as u16 + 1, *asset)?;
    }
    for (idx, timestamp) in timestamps.iter().enumerate() {
        pivot.write_string(idx as u32 + 1, 0, *timestamp)?;
    }
    for (row, col, value) in points {
        pivot.write_number(row, col, value)?;
    }

    if assets.is_empty() {
        return Ok((None, pivot));
    }

    let last_row = timestamps.len() as u32;
    let mut chart = new_line_chart(kind);
    for idx in 0..assets.len() {
        let col = idx as u16 + 1;
        chart
            .add_series()
            .set_name((CHART_DATA_SHEET, 0, col))
            .set_categories((CHART_DATA_SHEET, 1, 0, last_row, 0))
            .set_values((CHART_DATA_SHEET, 1, col, last_row, col));
    }
    Ok((Some(chart), pivot))
}
