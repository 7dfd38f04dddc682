//! Valued rows as they are persisted to export targets and read back by the
//! history commands.

use crate::core::balance::Balance;
use crate::core::valuation::{to_fiat, to_reference_unit};
use chrono::{Local, NaiveDateTime, SubsecRound};
use rust_decimal::Decimal;

/// Timestamp layout shared by every export format and the history parser.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One asset's row in the values stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetValue {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub balance: Decimal,
    pub price: Decimal,
    pub value: Decimal,
    pub fiat_value: Decimal,
    pub reference_unit_value: Decimal,
    pub source: String,
}

impl AssetValue {
    pub fn from_balance(balance: &Balance, fiat_rate: Decimal, reference_unit_price: Decimal) -> Self {
        Self {
            timestamp: balance.timestamp().naive_local().trunc_subsecs(0),
            asset: balance.asset().to_string(),
            balance: balance.balance(),
            price: balance.price(),
            value: balance.value(),
            fiat_value: to_fiat(balance.value(), fiat_rate),
            reference_unit_value: to_reference_unit(balance.value(), reference_unit_price),
            source: balance.source().to_string(),
        }
    }
}

/// Aggregate of one snapshot, in base currency, fiat and the reference unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioTotal {
    pub timestamp: NaiveDateTime,
    pub total_value: Decimal,
    pub total_fiat_value: Decimal,
    pub total_reference_unit_value: Decimal,
}

impl PortfolioTotal {
    pub fn from_balances(
        balances: &[Balance],
        fiat_rate: Decimal,
        reference_unit_price: Decimal,
        timestamp: NaiveDateTime,
    ) -> Self {
        let total_value = balances
            .iter()
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.value()));
        Self {
            timestamp,
            total_value,
            total_fiat_value: to_fiat(total_value, fiat_rate),
            total_reference_unit_value: to_reference_unit(total_value, reference_unit_price),
        }
    }
}

/// Everything one export call appends: the per-asset rows and their total.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub values: Vec<AssetValue>,
    pub total: PortfolioTotal,
}

impl Snapshot {
    /// Values every balance and stamps every row and the total with the latest
    /// fetch time, so one cycle's rows share a single timestamp.
    pub fn capture(balances: &[Balance], fiat_rate: Decimal, reference_unit_price: Decimal) -> Self {
        let timestamp = snapshot_timestamp(balances);
        let values = balances
            .iter()
            .map(|b| AssetValue {
                timestamp,
                ..AssetValue::from_balance(b, fiat_rate, reference_unit_price)
            })
            .collect();
        let total = PortfolioTotal::from_balances(balances, fiat_rate, reference_unit_price, timestamp);
        Self {
            timestamp,
            values,
            total,
        }
    }
}

pub fn snapshot_timestamp(balances: &[Balance]) -> NaiveDateTime {
    balances
        .iter()
        .map(Balance::timestamp)
        .max()
        .unwrap_or_else(Local::now)
        .naive_local()
        .trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_capture_values_and_totals() {
        let t1 = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 2).unwrap();
        let balances = vec![
            Balance::at("BTC", dec!(0.5), dec!(60000), "Manual", t1),
            Balance::at("ETH", dec!(2), dec!(3000), "CoinGecko", t2),
        ];

        let snapshot = Snapshot::capture(&balances, dec!(10), dec!(60000));

        assert_eq!(snapshot.timestamp, t2.naive_local());
        assert_eq!(snapshot.values.len(), 2);
        assert_eq!(snapshot.total.timestamp, t2.naive_local());
        assert!(snapshot.values.iter().all(|v| v.timestamp == t2.naive_local()));
        assert_eq!(snapshot.values[0].fiat_value, dec!(300000));
        assert_eq!(snapshot.values[0].reference_unit_value, dec!(0.5));
        assert_eq!(snapshot.values[1].value, dec!(6000));
        assert_eq!(snapshot.values[1].reference_unit_value, dec!(0.1));
        assert_eq!(snapshot.total.total_value, dec!(36000));
        assert_eq!(snapshot.total.total_fiat_value, dec!(360000));
        assert_eq!(snapshot.total.total_reference_unit_value, dec!(0.6));
    }

    #[test]
    fn test_capture_stamps_rows_fetched_seconds_apart_alike() {
        let early = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let late = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 3).unwrap();
        let balances = vec![
            Balance::at("BTC", dec!(1), dec!(60000), "Manual", early),
            Balance::at("ETH", dec!(1), dec!(3000), "Manual", late),
            Balance::at("MYRIA", dec!(1000), dec!(0.002), "CoinGecko", early),
        ];

        let snapshot = Snapshot::capture(&balances, dec!(10), dec!(60000));

        let stamps: Vec<_> = snapshot.values.iter().map(|v| v.timestamp).collect();
        assert_eq!(stamps, vec![late.naive_local(); 3]);
        assert_eq!(snapshot.total.timestamp, late.naive_local());
    }

    #[test]
    fn test_missing_reference_price_degrades_to_zero() {
        let balances = vec![Balance::new("ETH", dec!(2), dec!(3000), "Manual")];
        let snapshot = Snapshot::capture(&balances, dec!(10), Decimal::ZERO);
        assert_eq!(snapshot.values[0].reference_unit_value, Decimal::ZERO);
        assert_eq!(snapshot.total.total_reference_unit_value, Decimal::ZERO);
    }
}
