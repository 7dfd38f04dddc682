//! Read-side of the CSV exports: tolerant parsing plus filter/sort/limit.

use crate::core::record::{AssetValue, PortfolioTotal, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

const VALUES_FIELDS: usize = 8;
const TOTALS_FIELDS: usize = 4;

/// A data line that could not be turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the source file.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub entries: Vec<T>,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Parsed<T> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn read_values_file(path: &Path) -> Result<Parsed<AssetValue>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open values file: {}", path.display()))?;
    parse_values(file)
}

pub fn read_totals_file(path: &Path) -> Result<Parsed<PortfolioTotal>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open totals file: {}", path.display()))?;
    parse_totals(file)
}

/// Parses a values export. The first line is taken as the header; malformed
/// data lines are skipped and reported, never fatal.
pub fn parse_values<R: Read>(reader: R) -> Result<Parsed<AssetValue>> {
    parse_records(reader, VALUES_FIELDS, |record| {
        Ok(AssetValue {
            timestamp: parse_timestamp(&record[0])?,
            asset: record[1].trim().to_string(),
            balance: parse_decimal("balance", &record[2])?,
            price: parse_decimal("price", &record[3])?,
            value: parse_decimal("value", &record[4])?,
            fiat_value: parse_decimal("fiat value", &record[5])?,
            reference_unit_value: parse_decimal("reference unit value", &record[6])?,
            source: record[7].trim().to_string(),
        })
    })
}

pub fn parse_totals<R: Read>(reader: R) -> Result<Parsed<PortfolioTotal>> {
    parse_records(reader, TOTALS_FIELDS, |record| {
        Ok(PortfolioTotal {
            timestamp: parse_timestamp(&record[0])?,
            total_value: parse_decimal("total value", &record[1])?,
            total_fiat_value: parse_decimal("total fiat value", &record[2])?,
            total_reference_unit_value: parse_decimal("total reference unit value", &record[3])?,
        })
    })
}

fn parse_records<R, T, F>(reader: R, expected_fields: usize, parse: F) -> Result<Parsed<T>>
where
    R: Read,
    F: Fn(&StringRecord) -> std::result::Result<T, String>,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    reader.headers().context("Failed to read header line")?;

    let mut parsed = Parsed {
        entries: Vec::new(),
        warnings: Vec::new(),
    };
    for result in reader.records() {
        let outcome = match result {
            Ok(record) => {
                let line = record.position().map_or(0, |p| p.line());
                if record.len() != expected_fields {
                    Err((
                        line,
                        format!("expected {expected_fields} fields, found {}", record.len()),
                    ))
                } else {
                    parse(&record).map_err(|reason| (line, reason))
                }
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                Err((line, e.to_string()))
            }
        };

        match outcome {
            Ok(entry) => parsed.entries.push(entry),
            Err((line, reason)) => {
                warn!(line, "Skipping malformed line: {reason}");
                parsed.warnings.push(ParseWarning { line, reason });
            }
        }
    }
    Ok(parsed)
}

fn parse_timestamp(field: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(field.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid timestamp '{field}': {e}"))
}

fn parse_decimal(name: &str, field: &str) -> std::result::Result<Decimal, String> {
    let trimmed = field.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| format!("invalid {name} '{field}'"))
}

/// Filters and ordering for values entries.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Case-insensitive exact asset match.
    pub asset: Option<String>,
    /// Case-insensitive exact source match.
    pub source: Option<String>,
    pub descending: bool,
    /// Maximum entries returned after sorting; 0 keeps all.
    pub limit: usize,
}

impl HistoryQuery {
    pub fn apply(&self, entries: Vec<AssetValue>) -> Vec<AssetValue> {
        let mut filtered: Vec<AssetValue> = entries
            .into_iter()
            .filter(|e| matches_filter(&e.asset, self.asset.as_deref()))
            .filter(|e| matches_filter(&e.source, self.source.as_deref()))
            .collect();
        sort_and_limit(&mut filtered, |e| e.timestamp, self.descending, self.limit);
        filtered
    }
}

#[derive(Debug, Clone, Default)]
pub struct TotalsQuery {
    pub descending: bool,
    pub limit: usize,
}

impl TotalsQuery {
    pub fn apply(&self, mut entries: Vec<PortfolioTotal>) -> Vec<PortfolioTotal> {
        sort_and_limit(&mut entries, |e| e.timestamp, self.descending, self.limit);
        entries
    }
}

fn matches_filter(value: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|f| value.eq_ignore_ascii_case(f.trim()))
}

fn sort_and_limit<T>(
    entries: &mut Vec<T>,
    key: impl Fn(&T) -> NaiveDateTime,
    descending: bool,
    limit: usize,
) {
    // Stable, so equal timestamps keep their file order.
    if descending {
        entries.sort_by(|a, b| key(b).cmp(&key(a)));
    } else {
        entries.sort_by_key(|e| key(e));
    }
    if limit > 0 {
        entries.truncate(limit);
    }
}

/// Distinct `(asset, source)` pairs, sorted by asset then source.
pub fn unique_assets(entries: &[AssetValue]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = entries
        .iter()
        .map(|e| (e.asset.clone(), e.source.clone()))
        .collect();
    pairs.sort();
    pairs.dedup();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const VALUES_CSV: &str = "\
Timestamp,Asset,Balance,Price,Value,FiatValue,ReferenceUnitValue,Source
2024-01-01 10:00:00,BTC,0.500,60000.000,30000.00,300000.00,0.50000000,Manual
2024-01-01 10:00:00,ETH,2.000,3000.000,6000.00,60000.00,0.10000000,Manual
2024-01-01 10:00:00,MYRIA,1000.000,0.002,2.00,20.00,0.00003333,CoinGecko
2024-01-01 10:05:00,BTC,0.500,61000.000,30500.00,305000.00,0.50000000,Manual
2024-01-01 10:05:00,ETH,2.000,3100.000,6200.00,62000.00,0.10163934,Manual
2024-01-01 10:05:00,MYRIA,1010.000,0.002,2.02,20.20,0.00003311,CoinGecko
2024-01-01 10:10:00,BTC,0.500,not-a-price,30250.00,302500.00,0.50000000,Manual
2024-01-01 10:10:00,ETH,2.000,3050.000,6100.00,61000.00,0.10082645,Manual
2024-01-01 10:10:00,MYRIA,1020.000,0.002,2.04,20.40,0.00003372,CoinGecko
2024-01-01 10:15:00,BTC,0.500,60000.000,30000.00,300000.00,0.50000000,Manual
";

    fn values() -> Vec<AssetValue> {
        parse_values(VALUES_CSV.as_bytes()).unwrap().entries
    }

    #[test]
    fn test_malformed_line_is_skipped_and_reported() {
        let parsed = parse_values(VALUES_CSV.as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 9);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 8);
        assert!(parsed.warnings[0].reason.contains("price"));
        assert_eq!(parsed.entries[0].asset, "BTC");
        assert_eq!(parsed.entries[0].value, dec!(30000.00));
    }

    #[test]
    fn test_wrong_field_count_and_bad_timestamp() {
        let csv = "\
Timestamp,TotalValue,TotalFiatValue,TotalReferenceUnitValue
2024-01-01 10:00:00,36002.00,360020.00,0.60003333
2024-01-01 10:05:00,36702.02
yesterday,1.00,10.00,0.00001
2024-01-01 10:15:00,36000.00,360000.00,0.60000000
";
        let parsed = parse_totals(csv.as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        let lines: Vec<u64> = parsed.warnings.iter().map(|w| w.line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert!(parsed.warnings[0].reason.contains("expected 4 fields"));
        assert!(parsed.warnings[1].reason.contains("timestamp"));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let parsed = parse_totals("Timestamp,TotalValue,TotalFiatValue,TotalReferenceUnitValue\n".as_bytes())
            .unwrap();
        assert!(parsed.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let query = HistoryQuery {
            asset: Some("btc".to_string()),
            ..Default::default()
        };
        let result = query.apply(values());
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|e| e.asset == "BTC"));

        let query = HistoryQuery {
            source: Some("coingecko".to_string()),
            ..Default::default()
        };
        assert_eq!(query.apply(values()).len(), 3);
    }

    #[test]
    fn test_unknown_filter_yields_empty() {
        let query = HistoryQuery {
            source: Some("Kraken".to_string()),
            ..Default::default()
        };
        assert!(query.apply(values()).is_empty());
    }

    #[test]
    fn test_sort_is_stable_and_limit_applies_after_sort() {
        let query = HistoryQuery {
            descending: true,
            limit: 4,
            ..Default::default()
        };
        let result = query.apply(values());
        let rows: Vec<(String, String)> = result
            .iter()
            .map(|e| (e.timestamp.format("%H:%M").to_string(), e.asset.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("10:15".to_string(), "BTC".to_string()),
                ("10:10".to_string(), "ETH".to_string()),
                ("10:10".to_string(), "MYRIA".to_string()),
                ("10:05".to_string(), "BTC".to_string()),
            ]
        );

        let ascending = HistoryQuery::default().apply(values());
        assert_eq!(ascending.len(), 9);
        assert_eq!(ascending[0].asset, "BTC");
        assert_eq!(ascending[1].asset, "ETH");
        assert_eq!(ascending[8].timestamp.format("%H:%M").to_string(), "10:15");
    }

    #[test]
    fn test_totals_query_limit() {
        let csv = "\
Timestamp,TotalValue,TotalFiatValue,TotalReferenceUnitValue
2024-01-01 10:05:00,2,20,0.2
2024-01-01 10:00:00,1,10,0.1
2024-01-01 10:10:00,3,30,0.3
";
        let entries = parse_totals(csv.as_bytes()).unwrap().entries;
        let result = TotalsQuery {
            descending: false,
            limit: 2,
        }
        .apply(entries);
        let values: Vec<Decimal> = result.iter().map(|t| t.total_value).collect();
        assert_eq!(values, vec![dec!(1), dec!(2)]);
    }

    #[test]
    fn test_unique_assets_sorted_pairs() {
        let pairs = unique_assets(&values());
        assert_eq!(
            pairs,
            vec![
                ("BTC".to_string(), "Manual".to_string()),
                ("ETH".to_string(), "Manual".to_string()),
                ("MYRIA".to_string(), "CoinGecko".to_string()),
            ]
        );
    }
}
