//! Conversions of a base-currency value into fiat and reference-unit amounts.
//!
//! Both functions are total: they never panic and never fail. A reference
//! price of zero (or below) yields zero rather than a division error, and
//! arithmetic overflow saturates at the `Decimal` bounds.

use rust_decimal::Decimal;

/// Converts a base-currency value into the reference unit (e.g. BTC).
pub fn to_reference_unit(usd_value: Decimal, reference_unit_price: Decimal) -> Decimal {
    if reference_unit_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    usd_value
        .checked_div(reference_unit_price)
        .unwrap_or_else(|| saturate(usd_value.is_sign_negative()))
}

/// Converts a base-currency value into fiat using `rate` fiat units per base unit.
pub fn to_fiat(usd_value: Decimal, rate: Decimal) -> Decimal {
    usd_value
        .checked_mul(rate)
        .unwrap_or_else(|| saturate(usd_value.is_sign_negative() != rate.is_sign_negative()))
}

fn saturate(negative: bool) -> Decimal {
    if negative { Decimal::MIN } else { Decimal::MAX }
}
