//! Quote line and total arithmetic

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::QuoteTotals;

/// Half-up rounding to cents
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Price shown on a quote line: base adjusted by a proportional delta plus an
/// absolute amount, rounded half-up to cents.
pub fn display_price(base_price: Decimal, row_delta: Decimal, row_amount: Decimal) -> Decimal {
    round_money(base_price * (Decimal::ONE + row_delta) + row_amount)
}

/// Subtotal over `(display_price, quantity)` pairs, tax and grand total
pub fn quote_totals<I>(lines: I, tax_rate: Decimal) -> QuoteTotals
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let subtotal: Decimal = lines
        .into_iter()
        .map(|(price, quantity)| price * Decimal::from(quantity))
        .sum();
    let subtotal = round_money(subtotal);
    let tax = round_money(subtotal * tax_rate);
    QuoteTotals {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}
