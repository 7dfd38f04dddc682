use super::ui::{
    StyleType, change_cell, header_cell, na_cell, new_styled_table, number_cell, print_separator,
    style_text,
};
use crate::core::balance::Balance;
use crate::core::sink::DisplaySink;
use crate::core::valuation::{to_fiat, to_reference_unit};
use crate::export::{AMOUNT_DP, REFERENCE_UNIT_DP, fixed};
use chrono::Local;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;
use std::sync::Mutex;

const BALANCE_DP: u32 = 4;
const PRICE_DP: u32 = 4;

/// Difference between two values, absolute and as a percentage of `previous`.
/// The percentage is `None` when there is no base to divide by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Change {
    pub absolute: Decimal,
    pub percent: Option<Decimal>,
}

impl Change {
    pub fn between(current: Decimal, previous: Decimal) -> Self {
        let absolute = current.saturating_sub(previous);
        let percent = if previous.is_zero() {
            None
        } else {
            absolute
                .checked_div(previous)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        };
        Self { absolute, percent }
    }
}

#[derive(Debug, Default)]
struct Previous {
    balances: Vec<Balance>,
    total_value: Option<Decimal>,
}

/// Prints each cycle as a table with changes against the previous cycle.
pub struct ConsoleDisplay {
    fiat_currency: String,
    reference_asset: String,
    previous: Mutex<Previous>,
}

impl ConsoleDisplay {
    pub fn new(fiat_currency: impl Into<String>, reference_asset: impl Into<String>) -> Self {
        Self {
            fiat_currency: fiat_currency.into(),
            reference_asset: reference_asset.into(),
            previous: Mutex::new(Previous::default()),
        }
    }

    fn balances_table(&self, balances: &[Balance], previous: &[Balance], fiat_rate: Decimal) -> Table {
        let mut table = new_styled_table();
        table.set_header(vec![
            header_cell("Coin"),
            header_cell("Balance"),
            header_cell("Price (USD)"),
            header_cell("Value (USD)"),
            header_cell(&format!("Value ({})", self.fiat_currency)),
            header_cell("Change"),
            header_cell("Change %"),
            header_cell("Source"),
        ]);

        for balance in balances {
            let prior = previous
                .iter()
                .find(|p| p.asset() == balance.asset() && p.source() == balance.source());
            let (change, percent) = change_cells(prior.map(|p| Change::between(balance.value(), p.value())));

            table.add_row(vec![
                Cell::new(balance.asset()),
                number_cell(fixed(balance.balance(), BALANCE_DP)),
                number_cell(fixed(balance.price(), PRICE_DP)),
                number_cell(fixed(balance.value(), AMOUNT_DP)),
                number_cell(fixed(to_fiat(balance.value(), fiat_rate), AMOUNT_DP)),
                change,
                percent,
                Cell::new(balance.source()),
            ]);
        }
        table
    }
}

fn change_cells(change: Option<Change>) -> (Cell, Cell) {
    match change {
        Some(change) => (
            change_cell(change.absolute, format!("{:+.2}", change.absolute)),
            change
                .percent
                .map_or_else(na_cell, |p| change_cell(p, format!("{p:+.2}%"))),
        ),
        None => (na_cell(), na_cell()),
    }
}

impl DisplaySink for ConsoleDisplay {
    fn render(&self, balances: &[Balance], fiat_rate: Decimal, reference_unit_price: Decimal) {
        let mut previous = self
            .previous
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let total = balances
            .iter()
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.value()));
        let table = self.balances_table(balances, &previous.balances, fiat_rate);

        print_separator();
        println!(
            "{} {}",
            style_text("Balances", StyleType::Title),
            style_text(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), StyleType::Subtle)
        );
        println!("{table}");

        let total_change = previous
            .total_value
            .map(|prev| Change::between(total, prev))
            .map(|c| match c.percent {
                Some(p) => format!(" ({:+.2} / {p:+.2}%)", c.absolute),
                None => format!(" ({:+.2})", c.absolute),
            })
            .unwrap_or_default();
        println!(
            "{} {}{}",
            style_text("Total (USD):", StyleType::TotalLabel),
            style_text(&fixed(total, AMOUNT_DP), StyleType::TotalValue),
            total_change
        );
        println!(
            "{} {}",
            style_text(&format!("Total ({}):", self.fiat_currency), StyleType::TotalLabel),
            style_text(&fixed(to_fiat(total, fiat_rate), AMOUNT_DP), StyleType::TotalValue)
        );
        if reference_unit_price.is_zero() {
            println!(
                "{} {}",
                style_text(&format!("Total ({}):", self.reference_asset), StyleType::TotalLabel),
                style_text("no price available", StyleType::Error)
            );
        } else {
            println!(
                "{} {}",
                style_text(&format!("Total ({}):", self.reference_asset), StyleType::TotalLabel),
                style_text(
                    &fixed(to_reference_unit(total, reference_unit_price), REFERENCE_UNIT_DP),
                    StyleType::TotalValue
                )
            );
        }
        println!(
            "{}",
            style_text("[space] refresh  [enter] quit", StyleType::Subtle)
        );

        previous.balances = balances.to_vec();
        previous.total_value = Some(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_change_between_values() {
        let change = Change::between(dec!(110), dec!(100));
        assert_eq!(change.absolute, dec!(10));
        assert_eq!(change.percent, Some(dec!(10)));

        let drop = Change::between(dec!(75), dec!(100));
        assert_eq!(drop.absolute, dec!(-25));
        assert_eq!(drop.percent, Some(dec!(-25)));
    }

    #[test]
    fn test_change_from_zero_has_no_percent() {
        let change = Change::between(dec!(5), Decimal::ZERO);
        assert_eq!(change.absolute, dec!(5));
        assert_eq!(change.percent, None);
    }

    #[test]
    fn test_render_remembers_previous_cycle() {
        let display = ConsoleDisplay::new("NOK", "BTC");
        let first = vec![Balance::new("BTC", dec!(1), dec!(60000), "Manual")];
        let second = vec![
            Balance::new("BTC", dec!(1), dec!(66000), "Manual"),
            Balance::new("ETH", dec!(1), dec!(3000), "Manual"),
        ];

        display.render(&first, dec!(10), dec!(60000));
        display.render(&second, dec!(10), dec!(66000));

        let previous = display.previous.lock().unwrap();
        assert_eq!(previous.balances.len(), 2);
        assert_eq!(previous.total_value, Some(dec!(69000)));
    }

    #[test]
    fn test_table_marks_new_assets_without_change() {
        let display = ConsoleDisplay::new("NOK", "BTC");
        let previous = vec![Balance::new("BTC", dec!(1), dec!(60000), "Manual")];
        let current = vec![
            Balance::new("BTC", dec!(1), dec!(66000), "Manual"),
            Balance::new("ETH", dec!(1), dec!(3000), "Manual"),
        ];

        let rendered = display.balances_table(&current, &previous, dec!(10)).to_string();
        assert!(rendered.contains("+6000.00"));
        assert!(rendered.contains("+10.00%"));
        assert!(rendered.contains("Value (NOK)"));
    }
}
