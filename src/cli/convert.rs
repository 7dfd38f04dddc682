use super::ui::new_progress_bar;
use crate::export::spreadsheet::{self, Cell, SheetKind};
use crate::history;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Rows written per workbook rewrite; each chunk advances the progress bar.
const CHUNK_ROWS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub values_workbook: PathBuf,
    pub totals_workbook: PathBuf,
    pub values_rows: usize,
    pub totals_rows: usize,
    pub skipped_lines: usize,
}

/// Target `<output_path>/<csv stem>.xlsx` for a CSV export.
fn workbook_path(csv: &Path, output_path: &Path) -> PathBuf {
    let stem = csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    output_path.join(format!("{stem}.xlsx"))
}

/// Replays a values CSV and a totals CSV into XLSX workbooks. Rows are
/// appended, so converting into an existing workbook extends it.
pub fn convert(values_file: &Path, totals_file: &Path, output_path: &Path) -> Result<ConvertSummary> {
    for file in [values_file, totals_file] {
        if !file.exists() {
            bail!("File not found: {}", file.display());
        }
    }

    let values = history::read_values_file(values_file)?;
    let totals = history::read_totals_file(totals_file)?;
    let values_rows: Vec<Vec<Cell>> = values.entries.iter().map(spreadsheet::values_row).collect();
    let totals_rows: Vec<Vec<Cell>> = totals.entries.iter().map(spreadsheet::totals_row).collect();

    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create output directory: {}", output_path.display()))?;
    let summary = ConvertSummary {
        values_workbook: workbook_path(values_file, output_path),
        totals_workbook: workbook_path(totals_file, output_path),
        values_rows: values_rows.len(),
        totals_rows: totals_rows.len(),
        skipped_lines: values.warnings.len() + totals.warnings.len(),
    };

    let pb = new_progress_bar((summary.values_rows + summary.totals_rows) as u64, true);
    for (rows, target, kind) in [
        (values_rows, &summary.values_workbook, SheetKind::Values),
        (totals_rows, &summary.totals_workbook, SheetKind::Totals),
    ] {
        pb.set_message(kind.sheet_name());
        for chunk in rows.chunks(CHUNK_ROWS) {
            spreadsheet::append_rows(target, kind, chunk.to_vec())?;
            pb.inc(chunk.len() as u64);
        }
    }
    pb.finish_and_clear();

    info!(
        values = %summary.values_workbook.display(),
        totals = %summary.totals_workbook.display(),
        "Converted CSV exports to XLSX"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VALUES: &str = "\
Timestamp,Asset,Balance,Price,Value,FiatValue,ReferenceUnitValue,Source
2024-01-01 10:00:00,BTC,0.500,60000.000,30000.00,300000.00,0.50000000,Manual
2024-01-01 10:00:00,ETH,2.000,3000.000,6000.00,60000.00,0.10000000,Manual
garbage line
2024-01-01 10:05:00,BTC,0.500,61000.000,30500.00,305000.00,0.50000000,Manual
";
    const TOTALS: &str = "\
Timestamp,TotalValue,TotalFiatValue,TotalReferenceUnitValue
2024-01-01 10:00:00,36000.00,360000.00,0.60000000
2024-01-01 10:05:00,36500.00,365000.00,0.59836066
";

    #[test]
    fn test_convert_replays_every_row() {
        let dir = tempdir().unwrap();
        let values = dir.path().join("crypto-portfolio-values.csv");
        let totals = dir.path().join("crypto-portfolio-totals.csv");
        fs::write(&values, VALUES).unwrap();
        fs::write(&totals, TOTALS).unwrap();
        let out = dir.path().join("xlsx");

        let summary = convert(&values, &totals, &out).unwrap();

        assert_eq!(summary.values_rows, 3);
        assert_eq!(summary.totals_rows, 2);
        assert_eq!(summary.skipped_lines, 1);
        assert_eq!(summary.values_workbook, out.join("crypto-portfolio-values.xlsx"));

        let rows = spreadsheet::read_rows(&summary.values_workbook, SheetKind::Values).unwrap();
        assert_eq!(rows.len(), 4);
        let rows = spreadsheet::read_rows(&summary.totals_workbook, SheetKind::Totals).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_missing_input_is_error() {
        let dir = tempdir().unwrap();
        let values = dir.path().join("values.csv");
        fs::write(&values, VALUES).unwrap();

        let err = convert(&values, &dir.path().join("missing.csv"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
